//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::sessions::SessionRegistry;
use crate::webhooks::{self, Dispatcher};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Event router
    pub dispatcher: Arc<Dispatcher>,
    /// Live tenant sessions (also held by the dispatcher)
    pub sessions: Arc<dyn SessionRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(config: Config, dispatcher: Dispatcher, sessions: Arc<dyn SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            sessions,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Platform callbacks
        .nest("/webhook", webhooks::router())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_size))
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Server version
    version: &'static str,
    /// Number of live tenant sessions
    live_sessions: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        live_sessions: state.sessions.names().len(),
    })
}
