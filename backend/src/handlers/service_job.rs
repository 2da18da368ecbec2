//! Service job HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, ServiceJob};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::service_job::{
    AssignInput, CreateServiceInput, ServiceFilter, StatusInput, UpdateServiceInput,
};
use crate::services::ServiceJobService;
use crate::AppState;

pub async fn list_services(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ServiceFilter>,
) -> AppResult<Json<PaginatedResponse<ServiceJob>>> {
    let service = ServiceJobService::new(state.db.clone());
    Ok(Json(service.list(&current_user.actor(), filter).await?))
}

pub async fn get_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(service_id): Path<Uuid>,
) -> AppResult<Json<ServiceJob>> {
    let service = ServiceJobService::new(state.db.clone());
    Ok(Json(service.get(&current_user.actor(), service_id).await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateServiceInput>,
) -> AppResult<(StatusCode, Json<ServiceJob>)> {
    let service = ServiceJobService::new(state.db.clone());
    let job = service.create(&current_user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn update_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(service_id): Path<Uuid>,
    Json(input): Json<UpdateServiceInput>,
) -> AppResult<Json<ServiceJob>> {
    let service = ServiceJobService::new(state.db.clone());
    Ok(Json(service.update(&current_user.actor(), service_id, input).await?))
}

pub async fn assign_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(service_id): Path<Uuid>,
    Json(input): Json<AssignInput>,
) -> AppResult<Json<ServiceJob>> {
    let service = ServiceJobService::new(state.db.clone());
    Ok(Json(service.assign(&current_user.actor(), service_id, input).await?))
}

pub async fn update_service_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(service_id): Path<Uuid>,
    Json(input): Json<StatusInput>,
) -> AppResult<Json<ServiceJob>> {
    let service = ServiceJobService::new(state.db.clone());
    Ok(Json(
        service
            .update_status(&current_user.actor(), service_id, input)
            .await?,
    ))
}

pub async fn delete_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(service_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = ServiceJobService::new(state.db.clone());
    service.delete(&current_user.actor(), service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
