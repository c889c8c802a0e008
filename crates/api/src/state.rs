use std::sync::Arc;

use testu_store::ReportStore;

use crate::config::ServerConfig;
use crate::engine::Dispatcher;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job queue, correlator and report pipeline.
    pub dispatcher: Arc<Dispatcher>,
    /// Report and digest persistence (digest retrieval reads through it).
    pub store: Arc<dyn ReportStore>,
}
