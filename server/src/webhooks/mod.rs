//! Inbound Webhooks
//!
//! Entry point for the messaging platform's callbacks: the subscription
//! handshake, signed event delivery, and the dispatcher that routes each
//! event to a tenant.

pub mod delivery;
pub mod dispatch;
pub mod handlers;
pub mod signing;
pub mod ssrf;
pub mod stores;
pub mod types;

use axum::routing::get;
use axum::Router;

pub use delivery::{ForwardError, Forwarder, HttpForwarder};
pub use dispatch::{DispatchTimeouts, Dispatcher};
pub use stores::{InstanceStore, PgStore, StoreError, TemplateStore};
pub use types::{DispatchAck, DispatchReport, EventKind, RouteFailure, Routed, Step};

use crate::api::AppState;

/// Platform callback routes.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/meta",
        get(handlers::verify_subscription).post(handlers::receive_event),
    )
}
