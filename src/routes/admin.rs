use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    models::{admin::AdminStats, auth::AuthenticatedUser},
    services::admin::AdminService,
    AppState,
};

/// GET /api-admin-stats
///
/// The `is_admin` claim may be stale, so admin status is re-read from the users table.
pub async fn admin_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<AdminStats>, ApiError> {
    let is_admin = AdminService::is_admin(&state.db, user.user_id).await?;
    if is_admin != Some(true) {
        return Err(ApiError::forbidden("Access denied. Admin required."));
    }
    AdminService::stats(&state.db).await.map(Json).map_err(ApiError::from)
}
