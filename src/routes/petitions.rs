use axum::{
    extract::{Query, State},
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
        petition::{
            CreatePetitionRequest, Petition, PetitionDetail, PetitionPage, PetitionQuery,
            UpdatePetitionRequest,
        },
    },
    services::petitions::PetitionService,
    AppState,
};

pub async fn list_petitions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PetitionQuery>,
) -> Result<Json<PetitionPage>, ApiError> {
    let subject = PetitionService::subject_for(&state.db, &user).await?;
    PetitionService::list(&state.db, &subject, &query).await.map(Json)
}

pub async fn get_petition(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PetitionDetail>, ApiError> {
    let subject = PetitionService::subject_for(&state.db, &user).await?;
    PetitionService::get(&state.db, &subject, id).await.map(Json)
}

pub async fn create_petition(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePetitionRequest>,
) -> Result<(StatusCode, Json<Petition>), ApiError> {
    let subject = PetitionService::subject_for(&state.db, &user).await?;
    let petition =
        PetitionService::create(&state.db, &subject, &body, state.config.petition_cost).await?;
    Ok((StatusCode::CREATED, Json(petition)))
}

pub async fn update_petition(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    Json(body): Json<UpdatePetitionRequest>,
) -> Result<Json<Petition>, ApiError> {
    let subject = PetitionService::subject_for(&state.db, &user).await?;
    PetitionService::update(&state.db, &subject, id, &body).await.map(Json)
}

pub async fn delete_petition(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let subject = PetitionService::subject_for(&state.db, &user).await?;
    PetitionService::delete(&state.db, &subject, id).await?;
    Ok(Json(json!({ "success": true })))
}
