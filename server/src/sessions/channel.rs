//! Inbox-backed Sessions
//!
//! A `ChannelSession` queues events on a bounded per-instance inbox. The
//! protocol layer that owns the connection drains the receiving end.

use std::sync::Arc;

use async_trait::async_trait;
use mg_common::InboundEvent;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use super::{LiveSession, SessionError, SessionLoader};
use crate::db;

/// Session that hands events to a bounded inbox.
#[derive(Debug)]
pub struct ChannelSession {
    name: String,
    inbox: mpsc::Sender<Arc<InboundEvent>>,
}

impl ChannelSession {
    /// Create a session and the receiving end of its inbox.
    pub fn new(name: &str, capacity: usize) -> (Self, mpsc::Receiver<Arc<InboundEvent>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.to_owned(),
                inbox: tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl LiveSession for ChannelSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn feed_event(&self, event: Arc<InboundEvent>) -> Result<(), SessionError> {
        self.inbox.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Full(self.name.clone()),
            TrySendError::Closed(_) => SessionError::Closed(self.name.clone()),
        })
    }

    fn is_open(&self) -> bool {
        !self.inbox.is_closed()
    }
}

/// Receives the inbox of every session the loader opens.
pub trait InboxConsumer: Send + Sync {
    fn attach(&self, instance: &str, inbox: mpsc::Receiver<Arc<InboundEvent>>);
}

/// Consumer that drains inboxes into the log. Stands in for a protocol
/// handler when none is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInboxConsumer;

impl InboxConsumer for TracingInboxConsumer {
    fn attach(&self, instance: &str, mut inbox: mpsc::Receiver<Arc<InboundEvent>>) {
        let instance = instance.to_owned();
        tokio::spawn(async move {
            while let Some(event) = inbox.recv().await {
                debug!(
                    instance = %instance,
                    entries = event.entries.len(),
                    "Session accepted platform event"
                );
            }
            info!(instance = %instance, "Session inbox closed");
        });
    }
}

/// Loads sessions for business-platform instances whose connection is open.
#[derive(Clone)]
pub struct PgSessionLoader {
    pool: PgPool,
    capacity: usize,
    consumer: Arc<dyn InboxConsumer>,
}

impl PgSessionLoader {
    pub fn new(pool: PgPool, capacity: usize, consumer: Arc<dyn InboxConsumer>) -> Self {
        Self {
            pool,
            capacity,
            consumer,
        }
    }
}

#[async_trait]
impl SessionLoader for PgSessionLoader {
    async fn load(&self) -> Result<Vec<String>, SessionError> {
        let instances = db::list_connected_instances(&self.pool).await?;
        Ok(instances.into_iter().map(|instance| instance.name).collect())
    }

    fn open(&self, name: &str) -> Result<Arc<dyn LiveSession>, SessionError> {
        let (session, inbox) = ChannelSession::new(name, self.capacity);
        self.consumer.attach(name, inbox);
        Ok(Arc::new(session))
    }
}
