//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every path is a WebSocket endpoint; the path itself is the client
//! identifier (`ws://host:port/alice`). A non-upgrade `GET /healthz` is
//! answered as a health check by the same handler.

pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::handle_ws_root))
        .route("/{*client_id}", get(ws::handle_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
