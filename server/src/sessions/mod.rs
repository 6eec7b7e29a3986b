//! Live Tenant Sessions
//!
//! In-memory registry of connected tenant sessions, keyed by instance name.
//! The router only ever looks sessions up, asks the registry to resync from
//! persisted state, and feeds raw events into them.

pub mod channel;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use mg_common::InboundEvent;
use thiserror::Error;

pub use channel::{ChannelSession, InboxConsumer, PgSessionLoader, TracingInboxConsumer};
pub use registry::{InstanceRegistry, SessionLoader};

/// A connected protocol handler for one tenant.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Instance name this session serves.
    fn name(&self) -> &str;

    /// Hand a raw platform event to the session.
    async fn feed_event(&self, event: Arc<InboundEvent>) -> Result<(), SessionError>;

    /// Whether the session can still accept events.
    fn is_open(&self) -> bool {
        true
    }
}

/// Registry of live sessions.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Live session for an instance, if one is open.
    fn get(&self, name: &str) -> Option<Arc<dyn LiveSession>>;

    /// Resync the registry with persisted instance state.
    ///
    /// Safe to call concurrently. Returns once the in-memory state reflects
    /// persisted state at least as of the call's start.
    async fn reload(&self) -> Result<(), SessionError>;

    /// Names of the sessions currently held.
    fn names(&self) -> Vec<String>;
}

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to load persisted instances: {0}")]
    Load(#[from] sqlx::Error),
    #[error("session loader unavailable: {0}")]
    LoaderUnavailable(String),
    #[error("session {0} is closed")]
    Closed(String),
    #[error("session {0} inbox is full")]
    Full(String),
}
