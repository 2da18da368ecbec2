//! Quote HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, Quote};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::quote::{CreateQuoteInput, QuoteFilter, UpdateQuoteInput};
use crate::services::QuoteService;
use crate::AppState;

pub async fn list_quotes(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<QuoteFilter>,
) -> AppResult<Json<PaginatedResponse<Quote>>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.list(&current_user.actor(), filter).await?))
}

pub async fn get_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
) -> AppResult<Json<Quote>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.get(&current_user.actor(), quote_id).await?))
}

pub async fn create_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateQuoteInput>,
) -> AppResult<(StatusCode, Json<Quote>)> {
    let service = QuoteService::new(state.db.clone());
    let quote = service.create(&current_user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn update_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
    Json(input): Json<UpdateQuoteInput>,
) -> AppResult<Json<Quote>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.update(&current_user.actor(), quote_id, input).await?))
}

pub async fn send_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
) -> AppResult<Json<Quote>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.send(&current_user.actor(), quote_id).await?))
}

pub async fn accept_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
) -> AppResult<Json<Quote>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.accept(&current_user.actor(), quote_id).await?))
}

pub async fn reject_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
) -> AppResult<Json<Quote>> {
    let service = QuoteService::new(state.db.clone());
    Ok(Json(service.reject(&current_user.actor(), quote_id).await?))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quote_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = QuoteService::new(state.db.clone());
    service.delete(&current_user.actor(), quote_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
