use axum::Router;

use crate::state::AppState;

pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod service;
pub mod store;
pub(crate) mod validate;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
