//! Statistics handlers
//!
//! Monthly series and the technician ranking can be downloaded as CSV with
//! `?format=csv`.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stats::{MyStats, StatsOverview, StatsQuery};
use crate::services::StatsService;
use crate::AppState;

/// JSON by default, a CSV attachment when asked for
fn respond<T: Serialize>(rows: Vec<T>, query: &StatsQuery, filename: &str) -> AppResult<Response> {
    if query.wants_csv() {
        let csv = StatsService::export_to_csv(&rows)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(rows).into_response())
    }
}

pub async fn get_overview(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<StatsOverview>> {
    let service = StatsService::new(state.db.clone());
    Ok(Json(service.overview(&current_user.actor()).await?))
}

pub async fn get_services_by_month(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Response> {
    let service = StatsService::new(state.db.clone());
    let rows = service
        .services_by_month(&current_user.actor(), query.months)
        .await?;
    respond(rows, &query, "services_by_month.csv")
}

pub async fn get_quotes_by_month(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Response> {
    let service = StatsService::new(state.db.clone());
    let rows = service
        .quotes_by_month(&current_user.actor(), query.months)
        .await?;
    respond(rows, &query, "quotes_by_month.csv")
}

pub async fn get_technician_ranking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Response> {
    let service = StatsService::new(state.db.clone());
    let rows = service
        .technician_ranking(&current_user.actor(), query.from, query.to)
        .await?;
    respond(rows, &query, "technician_ranking.csv")
}

pub async fn get_my_stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<MyStats>> {
    let service = StatsService::new(state.db.clone());
    Ok(Json(service.my_stats(&current_user.actor()).await?))
}
