use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which endpoint family a token is valid for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenScope::Access => "access",
            TokenScope::Refresh => "refresh",
        };
        write!(f, "{s}")
    }
}

/// Claims embedded in both access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user UUID
    pub email: String,
    pub is_admin: bool,
    pub iat: usize,
    pub exp: usize,
    pub scope: TokenScope,
    /// Refresh token id, used for rotation and revocation. Absent on access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A verified identity, ready to be turned into a token pair.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

/// Extracted from the validated access token by the axum extractor in `middleware::auth`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TokenScope::Access).unwrap(), "\"access\"");
        assert_eq!(serde_json::to_string(&TokenScope::Refresh).unwrap(), "\"refresh\"");
    }

    #[test]
    fn access_claims_omit_jti() {
        let claims = Claims {
            sub: Uuid::nil().to_string(),
            email: "a@b.c".into(),
            is_admin: false,
            iat: 1,
            exp: 2,
            scope: TokenScope::Access,
            jti: None,
        };
        let v = serde_json::to_value(&claims).unwrap();
        assert!(v.get("jti").is_none());
        assert_eq!(v["scope"], "access");
    }
}
