use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{errors::AppError, state::AppState};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
    extractors::AuthUser,
    service::AuthService,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
}

#[instrument(skip(service, payload))]
async fn register(
    State(service): State<AuthService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let user = service.register(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::with_user(user))))
}

#[instrument(skip(service, payload))]
async fn login(
    State(service): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let pair = service.login(&payload.email, &payload.password).await?;
    Ok(Json(AuthResponse::with_token(pair)))
}

#[instrument(skip(service, payload))]
async fn refresh(
    State(service): State<AuthService>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if payload.refresh_token.is_empty() {
        return Err(AppError::InvalidInput);
    }
    let pair = service.refresh(&payload.refresh_token).await?;
    Ok(Json(AuthResponse::with_token(pair)))
}

#[instrument(skip(service))]
async fn me(
    State(service): State<AuthService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<AuthResponse>, AppError> {
    let user = service.get_user(user_id).await?;
    Ok(Json(AuthResponse::with_user(user)))
}
