use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        user::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, LogoutRequest,
            RefreshTokenRequest, RegisterRequest, ResetPasswordRequest, VerifiedUser,
            VerifyResponse,
        },
    },
    services::auth::AuthService,
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Rate limit: 5 attempts per 15 min per email
    let rate_key = format!("rate:login:{}", body.email.trim().to_lowercase());
    check_rate_limit(state.redis.as_ref(), &rate_key, 5, 900).await?;

    AuthService::login(&state.db, &state.tokens, &body.email, &body.password)
        .await
        .map(Json)
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Rate limit: 10 attempts per hour per email
    let rate_key = format!("rate:register:{}", body.email.trim().to_lowercase());
    check_rate_limit(state.redis.as_ref(), &rate_key, 10, 3600).await?;

    AuthService::register(&state.db, &state.tokens, &body).await.map(Json)
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    AuthService::refresh(&state.db, &state.tokens, &body.refresh_token)
        .await
        .map(Json)
}

pub async fn logout(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // The body is optional: a bare logout just acknowledges.
    let body: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    AuthService::logout(&state.db, &state.tokens, body.refresh_token.as_deref()).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

/// Answers with the same message whether or not the email exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    // Rate limit: 3 attempts per 30 min per email
    let rate_key = format!("rate:forgot:{}", body.email.trim().to_lowercase());
    check_rate_limit(state.redis.as_ref(), &rate_key, 3, 1800).await?;

    if let Err(e) = AuthService::request_password_reset(
        &state.db,
        state.email.as_deref(),
        &body.email,
        &state.config.app_base_url,
    )
    .await
    {
        tracing::error!("password reset request failed: {e:#}");
    }
    Ok(Json(json!({
        "message": "If the email exists, you will receive instructions."
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    AuthService::reset_password(&state.db, &body.token, &body.new_password).await?;
    Ok(Json(json!({ "message": "Password updated" })))
}

/// Token validity is fully established by the extractor.
pub async fn verify(user: AuthenticatedUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        user: VerifiedUser {
            id: user.user_id,
            email: user.email,
            is_admin: user.is_admin,
        },
    })
}
