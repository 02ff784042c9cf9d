pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

use crate::services::llm_agent::AnalysisTransport;
use crate::services::session::SessionStore;
use crate::services::sheet::TableParser;

// Application state
pub struct AppState {
    pub config: config::Config,
    pub parser: TableParser,
    pub sessions: SessionStore,
    pub transport: Arc<dyn AnalysisTransport>,
}

impl AppState {
    pub fn new(config: config::Config, transport: Arc<dyn AnalysisTransport>) -> Self {
        Self {
            parser: TableParser::new(config.max_file_size),
            sessions: SessionStore::with_idle_timeout(config.session_idle_timeout),
            transport,
            config,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Leave headroom above the upload ceiling so oversized files reach the
    // parser and get a JSON error instead of a bare 413.
    let body_limit = state.config.max_file_size.saturating_mul(2);

    Router::new()
        .merge(routes::routes::<Arc<AppState>>())
        .merge(routes::sheets::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
