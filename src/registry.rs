//! Client registry: identifier to live connection.
//!
//! DESIGN
//! ======
//! One map behind one `std::sync::Mutex`, shared by every connection task
//! through a cheap `Clone`. The lock is never held across an `.await`:
//! `route` copies the target handle out, releases the lock, then waits for
//! room in the receiver's outbound queue. Only the sending task waits; the
//! receiver's writer task drains the queue independently of its reader.
//!
//! Registration is last-writer-wins. Each connection carries a `conn_id`
//! so `unregister` only removes the entry if it still belongs to the caller;
//! a superseded connection tearing down leaves the newer registration alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::{CloseFrame, Message, close_code};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::envelope::ClientId;

// =============================================================================
// CONNECTION HANDLE
// =============================================================================

/// Outbound side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::Sender<Message>,
}

/// Result of a routing attempt. For logging only; senders never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the receiver's outbound path.
    Delivered,
    /// No connection registered under the receiver identifier.
    NotFound,
    /// Receiver's outbound queue is full. Only the non-waiting close path
    /// reports this.
    QueueFull,
    /// Receiver's task is gone; message dropped.
    Closed,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { conn_id: Uuid::new_v4(), tx }
    }

    #[must_use]
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Enqueue a frame, waiting for queue space if the receiver is behind.
    pub async fn deliver(&self, payload: Message) -> RouteOutcome {
        match self.tx.send(payload).await {
            Ok(()) => RouteOutcome::Delivered,
            Err(_) => RouteOutcome::Closed,
        }
    }

    /// Ask the owning task to send a policy close frame and stop. Never waits.
    pub fn close(&self, reason: &str) -> RouteOutcome {
        let frame = CloseFrame { code: close_code::POLICY, reason: reason.into() };
        match self.tx.try_send(Message::Close(Some(frame))) {
            Ok(()) => RouteOutcome::Delivered,
            Err(TrySendError::Full(_)) => RouteOutcome::QueueFull,
            Err(TrySendError::Closed(_)) => RouteOutcome::Closed,
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<ClientId, ConnectionHandle>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, ConnectionHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the mapping for `id`.
    ///
    /// Returns the superseded handle, if any. It is not closed here.
    pub fn register(&self, id: ClientId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.lock().insert(id, handle)
    }

    /// Remove the mapping for `id` only if it still points at `conn_id`.
    ///
    /// Returns whether an entry was removed.
    pub fn unregister(&self, id: &str, conn_id: Uuid) -> bool {
        let mut clients = self.lock();
        if clients.get(id).is_some_and(|h| h.conn_id == conn_id) {
            clients.remove(id);
            return true;
        }
        false
    }

    /// Forward `payload` to the connection registered as `receiver`.
    pub async fn route(&self, receiver: &str, payload: Message) -> RouteOutcome {
        let target = self.lock().get(receiver).cloned();
        match target {
            Some(handle) => handle.deliver(payload).await,
            None => RouteOutcome::NotFound,
        }
    }

    /// Register and return a guard that unregisters on drop, plus the
    /// superseded handle.
    pub fn register_guarded(
        &self,
        id: ClientId,
        handle: ConnectionHandle,
    ) -> (Registration, Option<ConnectionHandle>) {
        let conn_id = handle.conn_id;
        let previous = self.register(id.clone(), handle);
        let guard = Registration { registry: self.clone(), client_id: id, conn_id };
        (guard, previous)
    }

    /// Number of registered identifiers.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Connection currently registered under `id`.
    #[cfg(test)]
    #[must_use]
    pub fn connection_id(&self, id: &str) -> Option<Uuid> {
        self.lock().get(id).map(ConnectionHandle::conn_id)
    }
}

// =============================================================================
// REGISTRATION GUARD
// =============================================================================

/// Holds one connection's registry entry. Dropping it runs `unregister`,
/// including when the owning task unwinds.
pub struct Registration {
    registry: Registry,
    client_id: ClientId,
    conn_id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = self.registry.unregister(&self.client_id, self.conn_id);
        debug!(client_id = %self.client_id, conn_id = %self.conn_id, removed, "registry: unregister");
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
