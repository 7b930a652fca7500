//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the client registry and the relay configuration. Connection
//! tasks share nothing else.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::registry::Registry;

/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { registry: Registry::new(), config: Arc::new(config) }
    }
}
