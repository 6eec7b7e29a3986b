//! Instance Session Registry
//!
//! Holds live sessions in a `DashMap` keyed by instance name. Reloads resync
//! the map with the loader's view of persisted state.
//!
//! Concurrent reloads are collapsed with a ticket counter: each caller takes a
//! ticket before queueing on the reload lock, and a reload records the highest
//! ticket issued before it started loading. A caller whose ticket is already
//! covered returns without loading again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{LiveSession, SessionError, SessionRegistry};
use crate::observability::metrics;

/// Source of persisted session state.
#[async_trait]
pub trait SessionLoader: Send + Sync {
    /// Names of instances that should currently hold a live session.
    async fn load(&self) -> Result<Vec<String>, SessionError>;

    /// Open a new session for an instance.
    fn open(&self, name: &str) -> Result<Arc<dyn LiveSession>, SessionError>;
}

/// Thread-safe registry of live instance sessions.
pub struct InstanceRegistry {
    sessions: DashMap<String, Arc<dyn LiveSession>>,
    loader: Arc<dyn SessionLoader>,
    /// Reload tickets handed out so far.
    requested: AtomicU64,
    /// Highest ticket covered by a completed reload.
    covered: Mutex<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ReloadSummary {
    opened: usize,
    kept: usize,
    dropped: usize,
}

impl InstanceRegistry {
    /// Create an empty registry backed by `loader`.
    pub fn new(loader: Arc<dyn SessionLoader>) -> Self {
        Self {
            sessions: DashMap::new(),
            loader,
            requested: AtomicU64::new(0),
            covered: Mutex::new(0),
        }
    }

    /// Register a session opened outside a reload. Returns the session it replaced.
    pub fn register(&self, session: Arc<dyn LiveSession>) -> Option<Arc<dyn LiveSession>> {
        self.sessions.insert(session.name().to_owned(), session)
    }

    /// Number of sessions held (open or not).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn apply(&self, names: Vec<String>) -> ReloadSummary {
        let wanted: HashSet<String> = names.into_iter().collect();
        let mut summary = ReloadSummary::default();

        let before = self.sessions.len();
        self.sessions.retain(|name, _| wanted.contains(name));
        summary.dropped = before - self.sessions.len();

        for name in &wanted {
            let open = self
                .sessions
                .get(name)
                .is_some_and(|session| session.is_open());
            if open {
                summary.kept += 1;
                continue;
            }

            match self.loader.open(name) {
                Ok(session) => {
                    self.sessions.insert(name.clone(), session);
                    summary.opened += 1;
                }
                Err(e) => {
                    warn!(instance = %name, error = %e, "Failed to open session during reload");
                }
            }
        }

        summary
    }
}

#[async_trait]
impl SessionRegistry for InstanceRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn LiveSession>> {
        let session = self
            .sessions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))?;
        session.is_open().then_some(session)
    }

    #[instrument(skip(self))]
    async fn reload(&self) -> Result<(), SessionError> {
        let ticket = self.requested.fetch_add(1, Ordering::AcqRel) + 1;
        let mut covered = self.covered.lock().await;

        if *covered >= ticket {
            debug!(ticket, covered = *covered, "Reload satisfied by a concurrent resync");
            metrics::record_session_reload("deduplicated");
            return Ok(());
        }

        // Every ticket issued up to here was requested before this load starts.
        let snapshot = self.requested.load(Ordering::Acquire);

        let names = match self.loader.load().await {
            Ok(names) => names,
            Err(e) => {
                metrics::record_session_reload("failed");
                return Err(e);
            }
        };

        let summary = self.apply(names);
        *covered = snapshot;

        info!(
            opened = summary.opened,
            kept = summary.kept,
            dropped = summary.dropped,
            live = self.sessions.len(),
            "Session registry reloaded"
        );
        metrics::record_session_reload("ok");
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}
