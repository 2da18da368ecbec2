//! Client HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Client, Equipment, PaginatedResponse, ServiceJob};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::client::{ClientFilter, CreateClientInput, UpdateClientInput};
use crate::services::ClientService;
use crate::AppState;

pub async fn list_clients(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ClientFilter>,
) -> AppResult<Json<PaginatedResponse<Client>>> {
    let service = ClientService::new(state.db.clone());
    Ok(Json(service.list(&current_user.actor(), filter).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Client>> {
    let service = ClientService::new(state.db.clone());
    Ok(Json(service.get(&current_user.actor(), client_id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateClientInput>,
) -> AppResult<(StatusCode, Json<Client>)> {
    let service = ClientService::new(state.db.clone());
    let client = service.create(&current_user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
    Json(input): Json<UpdateClientInput>,
) -> AppResult<Json<Client>> {
    let service = ClientService::new(state.db.clone());
    Ok(Json(service.update(&current_user.actor(), client_id, input).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = ClientService::new(state.db.clone());
    service.delete(&current_user.actor(), client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_client_equipment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Vec<Equipment>>> {
    let service = ClientService::new(state.db.clone());
    Ok(Json(service.equipment(&current_user.actor(), client_id).await?))
}

pub async fn list_client_services(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Vec<ServiceJob>>> {
    let service = ClientService::new(state.db.clone());
    Ok(Json(service.services(&current_user.actor(), client_id).await?))
}
