use crate::state::AppState;
use axum::Router;

pub mod confirmation;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod password;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
