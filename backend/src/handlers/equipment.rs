//! Equipment HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Equipment, ServiceJob};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::equipment::{CreateEquipmentInput, EquipmentFilter, UpdateEquipmentInput};
use crate::services::EquipmentService;
use crate::AppState;

pub async fn list_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<EquipmentFilter>,
) -> AppResult<Json<Vec<Equipment>>> {
    let service = EquipmentService::new(state.db.clone());
    Ok(Json(service.list(&current_user.actor(), filter).await?))
}

pub async fn get_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(equipment_id): Path<Uuid>,
) -> AppResult<Json<Equipment>> {
    let service = EquipmentService::new(state.db.clone());
    Ok(Json(service.get(&current_user.actor(), equipment_id).await?))
}

pub async fn create_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateEquipmentInput>,
) -> AppResult<(StatusCode, Json<Equipment>)> {
    let service = EquipmentService::new(state.db.clone());
    let equipment = service.create(&current_user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(equipment)))
}

pub async fn update_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(equipment_id): Path<Uuid>,
    Json(input): Json<UpdateEquipmentInput>,
) -> AppResult<Json<Equipment>> {
    let service = EquipmentService::new(state.db.clone());
    Ok(Json(
        service
            .update(&current_user.actor(), equipment_id, input)
            .await?,
    ))
}

pub async fn delete_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(equipment_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = EquipmentService::new(state.db.clone());
    service.delete(&current_user.actor(), equipment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Services performed on the equipment
pub async fn equipment_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(equipment_id): Path<Uuid>,
) -> AppResult<Json<Vec<ServiceJob>>> {
    let service = EquipmentService::new(state.db.clone());
    Ok(Json(service.history(&current_user.actor(), equipment_id).await?))
}
