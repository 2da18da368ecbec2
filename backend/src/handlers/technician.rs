//! Technician HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ServiceJob, Technician};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::technician::{
    CreateTechnicianInput, TechnicianFilter, TechnicianListing, TechnicianView,
    UpdateTechnicianInput,
};
use crate::services::TechnicianService;
use crate::AppState;

pub async fn list_technicians(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<TechnicianFilter>,
) -> AppResult<Json<TechnicianListing>> {
    let service = TechnicianService::new(state.db.clone());
    Ok(Json(service.list(&current_user.actor(), filter).await?))
}

pub async fn get_technician(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
) -> AppResult<Json<TechnicianView>> {
    let service = TechnicianService::new(state.db.clone());
    Ok(Json(service.get(&current_user.actor(), technician_id).await?))
}

pub async fn create_technician(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTechnicianInput>,
) -> AppResult<(StatusCode, Json<Technician>)> {
    let service = TechnicianService::new(state.db.clone());
    let technician = service.create(&current_user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(technician)))
}

pub async fn update_technician(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
    Json(input): Json<UpdateTechnicianInput>,
) -> AppResult<Json<Technician>> {
    let service = TechnicianService::new(state.db.clone());
    Ok(Json(
        service
            .update(&current_user.actor(), technician_id, input)
            .await?,
    ))
}

pub async fn delete_technician(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = TechnicianService::new(state.db.clone());
    service.delete(&current_user.actor(), technician_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_technician_services(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
) -> AppResult<Json<Vec<ServiceJob>>> {
    let service = TechnicianService::new(state.db.clone());
    Ok(Json(
        service
            .services(&current_user.actor(), technician_id)
            .await?,
    ))
}
