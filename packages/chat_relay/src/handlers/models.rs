use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;

/// The catalog fetched from the provider at startup.
pub async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.models().to_vec())
}
