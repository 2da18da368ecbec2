//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use shared::User;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::auth::{AuthTokens, ChangePasswordInput, LoginInput, RegisterInput};
use crate::services::AuthService;
use crate::AppState;

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub profile_id: Option<Uuid>,
}

/// Self sign-up for clients
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<(StatusCode, Json<AuthTokens>), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<Json<AuthTokens>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.login(body).await?))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.refresh_token(&body.refresh_token).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service
        .logout(current_user.0.user_id, &body.refresh_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<MeResponse>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let (user, profile_id) = auth_service.me(current_user.0.user_id).await?;
    Ok(Json(MeResponse { user, profile_id }))
}

pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service
        .change_password(current_user.0.user_id, body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
