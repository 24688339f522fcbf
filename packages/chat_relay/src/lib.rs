//! Chat relay: multiplexes browser conversations onto a local Ollama endpoint.
//!
//! Browsers hold one WebSocket each and address any number of conversations
//! over it by id. Each conversation is a [`session::Session`] kept in the
//! [`registry::Registry`]; answers stream back chunk by chunk, tagged with
//! the conversation id.

use axum::{Router, routing::get};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod handlers;
pub mod registry;
pub mod session;
pub mod ws;

#[cfg(test)]
mod test_helpers;

use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    /// Directory the browser UI is served from.
    pub public_dir: PathBuf,
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn create_router(state: AppState) -> Router {
    let public_dir = state.public_dir.clone();
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(handlers::websocket_handler))
        .route("/api/ws", get(handlers::websocket_handler))
        .route("/models", get(handlers::models_handler))
        .route("/api/models", get(handlers::models_handler))
        .route("/health", get(handlers::health_handler))
        .route_service("/chat", ServeFile::new(public_dir.join("chat.html")))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
