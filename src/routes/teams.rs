use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::path::ApiPath,
    models::{
        auth::AuthenticatedUser,
        team::{
            AddMemberRequest, CreateTeamRequest, Membership, Team, TeamBalance, TeamDetail,
            TeamMemberView, TeamRole, UpdateTeamRequest,
        },
    },
    services::{
        policy::{decide_team, TeamAction},
        teams::TeamService,
    },
    AppState,
};

/// Gate a team operation on the caller's role. Missing teams answer 404
/// before any permission check.
async fn require_team(
    state: &AppState,
    user: &AuthenticatedUser,
    team_id: Uuid,
    action: TeamAction,
) -> Result<(), ApiError> {
    if !TeamService::exists(&state.db, team_id).await? {
        return Err(ApiError::not_found("Team not found"));
    }
    let role = TeamService::role_in(&state.db, team_id, user.user_id).await?;
    if !decide_team(user.is_admin, role, action).is_allowed() {
        return Err(ApiError::forbidden("Access denied to this team"));
    }
    Ok(())
}

pub async fn list_teams(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Membership>>, ApiError> {
    let memberships = TeamService::list_memberships(&state.db, user.user_id).await?;
    Ok(Json(memberships))
}

pub async fn create_team(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    let team = TeamService::create(&state.db, user.user_id, &body.name).await?;
    tracing::info!(team_id = %team.id, owner = %user.user_id, "team created");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn get_team(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TeamDetail>, ApiError> {
    require_team(&state, &user, id, TeamAction::View).await?;
    TeamService::get_detail(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Team not found"))
}

pub async fn update_team(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    Json(body): Json<UpdateTeamRequest>,
) -> Result<Json<Team>, ApiError> {
    require_team(&state, &user, id, TeamAction::Manage).await?;
    TeamService::update(&state.db, id, body.name.as_deref()).await.map(Json)
}

pub async fn delete_team(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_team(&state, &user, id, TeamAction::Manage).await?;
    if !TeamService::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Team not found"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMemberView>), ApiError> {
    require_team(&state, &user, id, TeamAction::Manage).await?;
    let role = body.role.unwrap_or(TeamRole::Member);
    let member = TeamService::add_member(&state.db, id, &body.email, role).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath((id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    require_team(&state, &user, id, TeamAction::Manage).await?;
    TeamService::remove_member(&state.db, id, member_id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn team_balance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TeamBalance>, ApiError> {
    require_team(&state, &user, id, TeamAction::View).await?;
    TeamService::balance(&state.db, id).await.map(Json)
}
