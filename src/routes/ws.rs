//! WebSocket handler: per-connection relay loop.
//!
//! DESIGN
//! ======
//! The request path names the client. On upgrade the socket is split:
//! - Reader loop: incoming client frames → read `receiver` → route the
//!   original frame, waiting if the receiver's queue is full
//! - Writer task: frames routed to this client by peers → socket
//!
//! The writer never waits on the reader, so two clients blocked on each
//! other's full queues still drain.
//!
//! Nothing is ever sent back to the sender. Malformed envelopes and routing
//! misses are dropped and logged; only transport closure ends the loop.
//!
//! LIFECYCLE
//! =========
//! 1. Extract identifier from path (empty → 400 unless allowed by config)
//! 2. Upgrade → register (optionally closing a superseded connection)
//! 3. Relay until peer close, transport error, or supersede close
//! 4. Unregister (same-connection only) → stop writer → close socket
//!
//! A plain `GET /healthz` without upgrade headers is the health check; an
//! upgrade on the same path registers a client named `healthz`.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::EmptyIdPolicy;
use crate::envelope::{self, ClientId};
use crate::registry::{ConnectionHandle, Registry, RouteOutcome};
use crate::state::AppState;

/// Close reason sent to a connection replaced by a newer registration.
pub const SUPERSEDED_REASON: &str = "superseded";

/// Path answering plain (non-upgrade) health checks.
pub const HEALTH_PATH: &str = "healthz";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("client identifier required")]
    EmptyIdentifier,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(client_path): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => upgrade(state, &client_path, ws),
        Err(_) if client_path == HEALTH_PATH => StatusCode::OK.into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// `GET /` carries no identifier; goes through the same policy.
pub async fn handle_ws_root(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, "", ws)
}

fn upgrade(state: AppState, client_path: &str, ws: WebSocketUpgrade) -> Response {
    let client_id = match extract_client_id(client_path, state.config.empty_id_policy) {
        Ok(id) => id,
        Err(e) => {
            warn!(path = client_path, error = %e, "ws: rejected connection");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, client_id))
}

/// Derive the client identifier from the request path by stripping
/// surrounding slashes.
///
/// # Errors
///
/// Returns [`HandshakeError::EmptyIdentifier`] when nothing is left and the
/// policy is [`EmptyIdPolicy::Reject`].
pub fn extract_client_id(client_path: &str, policy: EmptyIdPolicy) -> Result<ClientId, HandshakeError> {
    let id = client_path.trim_matches('/');
    if id.is_empty() && policy == EmptyIdPolicy::Reject {
        return Err(HandshakeError::EmptyIdentifier);
    }
    Ok(id.to_string())
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(socket: WebSocket, state: AppState, client_id: ClientId) {
    let (tx, rx) = mpsc::channel::<Message>(state.config.outbound_buffer);
    let handle = ConnectionHandle::new(tx);
    let conn_id = handle.conn_id();

    let (registration, superseded) = state.registry.register_guarded(client_id.clone(), handle);
    if let Some(previous) = superseded {
        info!(%client_id, %conn_id, superseded = %previous.conn_id(), "ws: identifier re-registered");
        if state.config.close_superseded {
            let outcome = previous.close(SUPERSEDED_REASON);
            if outcome != RouteOutcome::Delivered {
                warn!(%client_id, superseded = %previous.conn_id(), ?outcome, "ws: superseded close not queued");
            }
        }
    }
    info!(%client_id, %conn_id, clients = state.registry.len(), "ws: client connected");

    let (sink, mut stream) = socket.split();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut writer = tokio::spawn(write_outbound(sink, rx, shutdown_rx));

    // `Some` when the writer ended first (close sent or write failed).
    let writer_exit = loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break None };
                match msg {
                    Message::Text(_) | Message::Binary(_) => {
                        relay_frame(&state.registry, &client_id, msg).await;
                    }
                    Message::Close(_) => break None,
                    _ => {}
                }
            }
            result = &mut writer => break Some(result),
        }
    };

    // Registry first: the entry must go even if closing the socket fails.
    drop(registration);

    let sink = match writer_exit {
        Some(result) => result.ok().flatten(),
        None => {
            let _ = shutdown_tx.send(());
            writer.await.ok().flatten()
        }
    };
    if let Some(mut sink) = sink {
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!(%client_id, %conn_id, error = %e, "ws: close after disconnect failed");
        }
    }
    info!(%client_id, %conn_id, "ws: client disconnected");
}

/// Drain the outbound queue into the socket.
///
/// Returns the sink when stopped by `shutdown`, `None` once a close frame
/// was sent or a write failed.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    mut shutdown: oneshot::Receiver<()>,
) -> Option<SplitSink<WebSocket, Message>> {
    loop {
        tokio::select! {
            out = rx.recv() => {
                // Registry dropped every sender; nothing more can arrive.
                let Some(out) = out else { return Some(sink) };
                let closing = matches!(out, Message::Close(_));
                if sink.send(out).await.is_err() || closing {
                    return None;
                }
            }
            _ = &mut shutdown => return Some(sink),
        }
    }
}

// =============================================================================
// ROUTING
// =============================================================================

/// Route one inbound frame by its `receiver`, forwarding the frame as-is.
///
/// Returns `None` when the frame was dropped as malformed.
async fn relay_frame(registry: &Registry, client_id: &str, frame: Message) -> Option<RouteOutcome> {
    let parsed = match &frame {
        Message::Text(text) => envelope::receiver_of(text.as_str().as_bytes()),
        Message::Binary(bytes) => envelope::receiver_of(bytes),
        _ => return None,
    };

    let receiver = match parsed {
        Ok(receiver) => receiver,
        Err(e) => {
            debug!(%client_id, code = e.error_code(), error = %e, "ws: dropped inbound frame");
            return None;
        }
    };

    let outcome = registry.route(&receiver, frame).await;
    match outcome {
        RouteOutcome::Delivered => debug!(%client_id, %receiver, "ws: routed"),
        RouteOutcome::NotFound => debug!(%client_id, %receiver, "ws: receiver not connected"),
        RouteOutcome::QueueFull => warn!(%client_id, %receiver, "ws: receiver queue full"),
        RouteOutcome::Closed => warn!(%client_id, %receiver, "ws: receiver connection gone, dropped"),
    }
    Some(outcome)
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
