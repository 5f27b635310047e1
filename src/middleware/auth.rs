use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::ApiError,
    models::auth::{AuthenticatedUser, TokenScope},
    services::tokens::TokenIssuer,
    AppState,
};

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::InvalidToken)?;
        decode_access_token(token, &state.tokens)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn decode_access_token(token: &str, tokens: &TokenIssuer) -> Result<AuthenticatedUser, ApiError> {
    let claims = tokens.verify(token, TokenScope::Access)?;
    Ok(AuthenticatedUser {
        user_id: claims.sub.parse().map_err(|_| ApiError::InvalidToken)?,
        email: claims.email,
        is_admin: claims.is_admin,
    })
}
