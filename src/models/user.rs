use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub avatar_url: Option<String>,
    pub oab_number: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// Request/Response DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub terms_accepted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

/// `user` object returned by every auth endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl From<&User> for AuthUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            // Falls back to the email when no display name was given.
            name: u.name.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| u.email.clone()),
            is_admin: u.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: AuthUser,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: VerifiedUser,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub avatar_url: Option<String>,
    pub oab_number: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            is_admin: u.is_admin,
            avatar_url: u.avatar_url,
            oab_number: u.oab_number,
            phone: u.phone,
            city: u.city,
            state: u.state,
            terms_accepted_at: u.terms_accepted_at,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// `is_admin`, `id` and timestamps are not user-editable and are simply not part of this body.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub oab_number: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ana@example.com".into(),
            password_hash: "$2b$12$hash".into(),
            name: name.map(str::to_string),
            is_admin: true,
            avatar_url: None,
            oab_number: None,
            phone: None,
            city: None,
            state: None,
            terms_accepted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn auth_user_name_falls_back_to_email() {
        assert_eq!(AuthUser::from(&user(None)).name, "ana@example.com");
        assert_eq!(AuthUser::from(&user(Some(" "))).name, "ana@example.com");
        assert_eq!(AuthUser::from(&user(Some("Ana"))).name, "Ana");
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let v = serde_json::to_value(user(None)).unwrap();
        assert!(v.get("password_hash").is_none());
    }

    #[test]
    fn register_request_uses_camel_case() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.c","password":"secret1","fullName":"A B","termsAccepted":true}"#,
        )
        .unwrap();
        assert_eq!(req.full_name.as_deref(), Some("A B"));
        assert!(req.terms_accepted);

        let missing: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert!(!missing.terms_accepted);
    }

    #[test]
    fn auth_response_shape() {
        let resp = AuthResponse {
            user: AuthUser::from(&user(Some("Ana"))),
            token: "t".into(),
            refresh_token: "r".into(),
        };
        let v = serde_json::to_value(resp).unwrap();
        assert_eq!(v["token"], "t");
        assert_eq!(v["refreshToken"], "r");
        assert_eq!(v["user"]["is_admin"], true);
    }
}
