use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        balance::BalanceResponse,
        user::{UpdateProfileRequest, UserProfile},
    },
    services::{balance::BalanceService, profile::ProfileService},
    AppState,
};

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, ApiError> {
    ProfileService::get(&state.db, user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    ProfileService::update(&state.db, user.user_id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// GET /api-tokens/balance
pub async fn token_balance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = BalanceService::for_user(&state.db, user.user_id).await?;
    Ok(Json(balance))
}
