use chrono::Utc;
use rand::Rng;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::{Identity, TokenScope},
        user::{AuthResponse, AuthUser, RefreshToken, RegisterRequest, User},
    },
    services::{
        email::{reset_url, EmailService},
        metrics::{LOGINS_COUNTER, REFRESH_COUNTER},
        tokens::{hash_token, TokenIssuer},
    },
};

pub const USER_COLUMNS: &str = "id, email, password_hash, name, is_admin, avatar_url, oab_number,
    phone, city, state, terms_accepted_at, created_at, updated_at";

const MIN_PASSWORD_LEN: usize = 6;
const BCRYPT_COST: u32 = 12;
const RESET_TOKEN_LEN: usize = 48;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub struct AuthService;

impl AuthService {
    /// Check email/password against the users table and open a new token family.
    pub async fn login(
        pool: &PgPool,
        tokens: &TokenIssuer,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::bad_request("Email and password are required"));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
        ))
        .bind(&email)
        .fetch_optional(pool)
        .await?;

        let Some(user) = user else {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            return Err(ApiError::InvalidCredentials);
        };

        let valid = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        if !valid {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            return Err(ApiError::InvalidCredentials);
        }

        let mut conn = pool.acquire().await?;
        let response = Self::issue_session(&mut *conn, tokens, &user, Uuid::new_v4()).await?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!(user_id = %user.id, "login succeeded");
        Ok(response)
    }

    pub async fn register(
        pool: &PgPool,
        tokens: &TokenIssuer,
        req: &RegisterRequest,
    ) -> Result<AuthResponse, ApiError> {
        if !req.terms_accepted {
            return Err(ApiError::bad_request("Terms of use not accepted"));
        }
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::bad_request("A valid email is required"));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = $1)")
                .bind(&email)
                .fetch_one(pool)
                .await?;
        if exists {
            return Err(ApiError::bad_request("Email already registered"));
        }

        let hash = bcrypt::hash(&req.password, BCRYPT_COST).map_err(anyhow::Error::from)?;
        let name = req
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut tx = pool.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, terms_accepted_at)
             VALUES ($1, $2, $3, NOW())
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&email)
        .bind(&hash)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            // Lost a race with a concurrent registration of the same email.
            let duplicate = e.as_database_error().is_some_and(|db| db.is_unique_violation());
            if duplicate {
                ApiError::bad_request("Email already registered")
            } else {
                ApiError::from(e)
            }
        })?;

        sqlx::query("INSERT INTO user_tokens (user_id, tokens) VALUES ($1, 0)")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        let response = Self::issue_session(&mut *tx, tokens, &user, Uuid::new_v4()).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "user registered");
        Ok(response)
    }

    /// Rotate a refresh token: the presented token is consumed and a new pair
    /// in the same family is returned. Presenting an already consumed token
    /// revokes the whole family.
    pub async fn refresh(
        pool: &PgPool,
        tokens: &TokenIssuer,
        refresh_token: &str,
    ) -> Result<AuthResponse, ApiError> {
        if refresh_token.trim().is_empty() {
            return Err(ApiError::bad_request("Refresh token is required"));
        }

        let claims = tokens.verify(refresh_token, TokenScope::Refresh).map_err(|e| {
            REFRESH_COUNTER.with_label_values(&["rejected"]).inc();
            ApiError::from(e)
        })?;
        let jti: Uuid = claims
            .jti
            .as_deref()
            .and_then(|j| j.parse().ok())
            .ok_or(ApiError::InvalidToken)?;
        let user_id: Uuid = claims.sub.parse().map_err(|_| ApiError::InvalidToken)?;

        let mut tx = pool.begin().await?;

        let stored = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(jti)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stored) = stored else {
            REFRESH_COUNTER.with_label_values(&["rejected"]).inc();
            return Err(ApiError::InvalidToken);
        };

        if stored.token_hash != hash_token(refresh_token) {
            REFRESH_COUNTER.with_label_values(&["rejected"]).inc();
            return Err(ApiError::InvalidToken);
        }

        if stored.revoked_at.is_some() {
            let revoked = sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW()
                 WHERE family_id = $1 AND revoked_at IS NULL",
            )
            .bind(stored.family_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            tx.commit().await?;

            warn!(
                user_id = %user_id,
                family_id = %stored.family_id,
                revoked,
                "refresh token reuse detected, token family revoked"
            );
            REFRESH_COUNTER.with_label_values(&["reused"]).inc();
            return Err(ApiError::InvalidToken);
        }

        if stored.expires_at < Utc::now() {
            REFRESH_COUNTER.with_label_values(&["rejected"]).inc();
            return Err(ApiError::InvalidToken);
        }

        // Fresh profile: admin status and name may have changed since login.
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::InvalidToken)?;

        let (response, new_id) =
            Self::issue_session_with_id(&mut *tx, tokens, &user, stored.family_id).await?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW(), replaced_by = $1 WHERE id = $2")
            .bind(new_id)
            .bind(jti)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        REFRESH_COUNTER.with_label_values(&["success"]).inc();
        Ok(response)
    }

    /// Revoke the refresh token's family. Unknown or invalid tokens are ignored.
    pub async fn logout(
        pool: &PgPool,
        tokens: &TokenIssuer,
        refresh_token: Option<&str>,
    ) -> Result<(), ApiError> {
        let Some(token) = refresh_token.filter(|t| !t.trim().is_empty()) else {
            return Ok(());
        };
        let Ok(claims) = tokens.verify(token, TokenScope::Refresh) else {
            return Ok(());
        };
        let Some(jti) = claims.jti.as_deref().and_then(|j| j.parse::<Uuid>().ok()) else {
            return Ok(());
        };

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW()
             WHERE family_id = (SELECT family_id FROM refresh_tokens WHERE id = $1)
               AND revoked_at IS NULL",
        )
        .bind(jti)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Create a reset token for `email` and mail it when SMTP is configured.
    /// Unknown emails are silently ignored. The raw token is returned so
    /// callers without a mail transport can still hand it over.
    pub async fn request_password_reset(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: &str,
        base_url: &str,
    ) -> anyhow::Result<Option<String>> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(None);
        }

        let user: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, name FROM users WHERE lower(email) = $1")
                .bind(&email)
                .fetch_optional(pool)
                .await?;
        let Some((user_id, name)) = user else {
            return Ok(None);
        };

        let token: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();
        let expires_at = Utc::now() + chrono::Duration::hours(RESET_TOKEN_TTL_HOURS);

        sqlx::query(
            "INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(pool)
        .await?;

        match email_svc {
            Some(svc) => {
                if let Err(e) = svc
                    .send_password_reset(&email, name.as_deref(), &reset_url(base_url, &token))
                    .await
                {
                    warn!(user_id = %user_id, "password reset email failed: {e:#}");
                }
            }
            None => warn!(user_id = %user_id, "password reset requested but SMTP is not configured"),
        }

        info!(user_id = %user_id, "password reset requested");
        Ok(Some(token))
    }

    /// Consume a reset token, set the new password and revoke every refresh
    /// token of the user.
    pub async fn reset_password(
        pool: &PgPool,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if token.trim().is_empty() {
            return Err(ApiError::bad_request("Invalid or expired reset token"));
        }

        let mut tx = pool.begin().await?;
        let row: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, user_id FROM password_reset_tokens
             WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
             FOR UPDATE",
        )
        .bind(hash_token(token.trim()))
        .fetch_optional(&mut *tx)
        .await?;
        let (token_id, user_id) =
            row.ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

        let hash = bcrypt::hash(new_password, BCRYPT_COST).map_err(anyhow::Error::from)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW()
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(user_id = %user_id, "password reset completed");
        Ok(())
    }

    async fn issue_session(
        conn: &mut PgConnection,
        tokens: &TokenIssuer,
        user: &User,
        family_id: Uuid,
    ) -> Result<AuthResponse, ApiError> {
        Self::issue_session_with_id(conn, tokens, user, family_id)
            .await
            .map(|(response, _)| response)
    }

    /// Mint a pair for `user` and persist the refresh half under `family_id`.
    async fn issue_session_with_id(
        conn: &mut PgConnection,
        tokens: &TokenIssuer,
        user: &User,
        family_id: Uuid,
    ) -> Result<(AuthResponse, Uuid), ApiError> {
        let identity = Identity {
            user_id: user.id,
            email: user.email.clone(),
            is_admin: user.is_admin,
        };
        let pair = tokens.issue_pair(&identity)?;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, family_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(pair.refresh_id)
        .bind(user.id)
        .bind(family_id)
        .bind(hash_token(&pair.refresh_token))
        .bind(pair.refresh_expires_at)
        .execute(&mut *conn)
        .await?;

        Ok((
            AuthResponse {
                user: AuthUser::from(user),
                token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            pair.refresh_id,
        ))
    }

    /// Delete refresh tokens that expired or were revoked more than `older_than_days` ago.
    pub async fn purge_refresh_tokens(pool: &PgPool, older_than_days: i64) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let deleted = sqlx::query(
            "DELETE FROM refresh_tokens
             WHERE expires_at < $1 OR (revoked_at IS NOT NULL AND revoked_at < $1)",
        )
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }
}
