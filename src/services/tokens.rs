use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::auth::{Claims, Identity, TokenScope};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT signing secret is not configured")]
    MissingSecret,
    #[error("token identity is missing a user id or email")]
    MissingIdentity,
    /// Deliberately opaque: expired, tampered and wrong-scope tokens look the same.
    #[error("invalid or expired token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_id: Uuid,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 tokens with a single shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn new(
        secret: &str,
        access_ttl_seconds: u64,
        refresh_ttl_days: u64,
    ) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_seconds,
            refresh_ttl_seconds: refresh_ttl_days * 86400,
        })
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(identity, Utc::now().timestamp() as usize)
    }

    /// Same as `issue_pair` with an explicit issue time (unix seconds).
    pub fn issue_pair_at(&self, identity: &Identity, now: usize) -> Result<TokenPair, TokenError> {
        if identity.user_id.is_nil() || identity.email.trim().is_empty() {
            return Err(TokenError::MissingIdentity);
        }

        let access = Claims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            is_admin: identity.is_admin,
            iat: now,
            exp: now + self.access_ttl_seconds as usize,
            scope: TokenScope::Access,
            jti: None,
        };

        let refresh_id = Uuid::new_v4();
        let refresh_exp = now + self.refresh_ttl_seconds as usize;
        let refresh = Claims {
            exp: refresh_exp,
            scope: TokenScope::Refresh,
            jti: Some(refresh_id.to_string()),
            ..access.clone()
        };

        let refresh_expires_at = Utc
            .timestamp_opt(refresh_exp as i64, 0)
            .single()
            .ok_or_else(|| TokenError::Signing("refresh expiry out of range".into()))?;

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            refresh_id,
            refresh_expires_at,
        })
    }

    /// Verify signature, expiry (no leeway) and scope.
    pub fn verify(&self, token: &str, expected: TokenScope) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!("token rejected: {e}");
                TokenError::Invalid
            })?
            .claims;

        if claims.scope != expected {
            tracing::debug!("token rejected: scope {} where {} expected", claims.scope, expected);
            return Err(TokenError::Invalid);
        }
        if expected == TokenScope::Refresh && claims.jti.is_none() {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Hex SHA-256 of a token string, stored instead of the raw refresh token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("unit-test-secret", 3600, 7).unwrap()
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "lawyer@example.com".into(),
            is_admin: false,
        }
    }

    fn now() -> usize {
        Utc::now().timestamp() as usize
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(TokenIssuer::new("", 3600, 7), Err(TokenError::MissingSecret)));
        assert!(matches!(TokenIssuer::new("  ", 3600, 7), Err(TokenError::MissingSecret)));
    }

    #[test]
    fn incomplete_identity_is_rejected() {
        let mut id = identity();
        id.email = String::new();
        assert_eq!(issuer().issue_pair(&id).unwrap_err(), TokenError::MissingIdentity);

        let mut id = identity();
        id.user_id = Uuid::nil();
        assert_eq!(issuer().issue_pair(&id).unwrap_err(), TokenError::MissingIdentity);
    }

    #[test]
    fn pair_carries_expected_claims() {
        let issuer = issuer();
        let id = identity();
        let issued_at = now();
        let pair = issuer.issue_pair_at(&id, issued_at).unwrap();

        let access = issuer.verify(&pair.access_token, TokenScope::Access).unwrap();
        assert_eq!(access.sub, id.user_id.to_string());
        assert_eq!(access.email, id.email);
        assert!(!access.is_admin);
        assert_eq!(access.exp - access.iat, 3600);
        assert!(access.jti.is_none());

        let refresh = issuer.verify(&pair.refresh_token, TokenScope::Refresh).unwrap();
        assert_eq!(refresh.exp - refresh.iat, 7 * 86400);
        assert_eq!(refresh.jti, Some(pair.refresh_id.to_string()));
        assert_eq!(pair.refresh_expires_at.timestamp() as usize, refresh.exp);
    }

    #[test]
    fn scopes_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer.issue_pair(&identity()).unwrap();
        assert_eq!(
            issuer.verify(&pair.access_token, TokenScope::Refresh).unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(
            issuer.verify(&pair.refresh_token, TokenScope::Access).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let issuer = issuer();
        let pair = issuer.issue_pair_at(&identity(), now() - 7200).unwrap();
        assert_eq!(
            issuer.verify(&pair.access_token, TokenScope::Access).unwrap_err(),
            TokenError::Invalid
        );
        // The refresh half of the same pair is still within its 7 days.
        assert!(issuer.verify(&pair.refresh_token, TokenScope::Refresh).is_ok());
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let issuer = issuer();
        let pair = issuer.issue_pair_at(&identity(), now() - 8 * 86400).unwrap();
        assert_eq!(
            issuer.verify(&pair.refresh_token, TokenScope::Refresh).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn tampered_and_foreign_tokens_look_like_expired_ones() {
        let issuer = issuer();
        let pair = issuer.issue_pair(&identity()).unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert_eq!(issuer.verify(&tampered, TokenScope::Access).unwrap_err(), TokenError::Invalid);

        let other = TokenIssuer::new("another-secret", 3600, 7).unwrap();
        assert_eq!(
            other.verify(&pair.access_token, TokenScope::Access).unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(issuer.verify("not-a-jwt", TokenScope::Access).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn every_pair_gets_a_fresh_refresh_id() {
        let issuer = issuer();
        let id = identity();
        let a = issuer.issue_pair(&id).unwrap();
        let b = issuer.issue_pair(&id).unwrap();
        assert_ne!(a.refresh_id, b.refresh_id);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_token("abc");
        assert_eq!(h, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(h, hash_token("abc"));
    }
}
