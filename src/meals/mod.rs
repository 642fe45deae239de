pub mod aggregate;
pub mod cache;
pub mod classifier;
pub mod dto;
pub mod handlers;
pub mod meal_type;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
