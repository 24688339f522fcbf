use axum::{
    extract::{
        Request, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::AppState;
use crate::ws;

/// Multiplexed WebSocket handler - single connection for all conversations
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| ws::handle_multiplexed_ws(socket, registry))
}

/// `/` upgrades WebSocket requests and serves `index.html` to everything else.
pub async fn root_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    if let Ok(ws) = ws {
        let registry = state.registry.clone();
        return ws.on_upgrade(move |socket| ws::handle_multiplexed_ws(socket, registry));
    }
    let index = ServeFile::new(state.public_dir.join("index.html"));
    match index.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
