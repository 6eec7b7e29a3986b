//! Dispatch Types
//!
//! Per-entry outcomes, the typed failures they carry, and the acknowledgement
//! returned to the platform.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::delivery::ForwardError;
use super::stores::StoreError;
use crate::sessions::SessionError;

/// Collaborator call a failure or timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    TemplateLookup,
    InstanceLookup,
    SessionReload,
    FeedEvent,
    Forward,
}

impl Step {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateLookup => "template lookup",
            Self::InstanceLookup => "instance lookup",
            Self::SessionReload => "session reload",
            Self::FeedEvent => "feed event",
            Self::Forward => "template forward",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the dispatcher classified an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Not an account event; accepted and dropped.
    Unclassified,
    /// Template approval-state notification.
    TemplateStatus,
    /// Message traffic routed to tenant sessions.
    Messages,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::TemplateStatus => "template_status",
            Self::Messages => "messages",
        }
    }
}

/// Successful route of one entry (or of the template status change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Status change posted to the template's callback URL.
    Forwarded {
        template_id: String,
        /// Reported template state, e.g. `APPROVED`.
        template_status: Option<String>,
        url: String,
        status: u16,
    },
    /// Event handed to the tenant's live session.
    Fed {
        instance: String,
        after_reload: bool,
    },
}

/// Why an entry could not be routed. Contained per entry, never surfaced to
/// the platform.
#[derive(Error, Debug)]
pub enum RouteFailure {
    #[error("routing identifier missing")]
    MissingRoutingId,
    #[error("tenant not found for identifier {number}")]
    TenantNotFound { number: String },
    #[error("instance {instance} has no live session after reload")]
    SessionUnavailable { instance: String },
    #[error("template identifier missing")]
    MissingTemplateId,
    #[error("template {template_id} not found")]
    TemplateNotFound { template_id: String },
    #[error("webhook not configured for template {template_id}")]
    WebhookNotConfigured { template_id: String },
    #[error("forward of template {template_id} to {url} failed: {source}")]
    Transport {
        template_id: String,
        url: String,
        #[source]
        source: ForwardError,
    },
    #[error("{step} failed: {source}")]
    Store {
        step: Step,
        #[source]
        source: StoreError,
    },
    #[error("session reload for {instance} failed: {source}")]
    Reload {
        instance: String,
        #[source]
        source: SessionError,
    },
    #[error("feeding event to {instance} failed: {source}")]
    Feed {
        instance: String,
        #[source]
        source: SessionError,
    },
    #[error("{step} timed out after {}ms", .limit.as_millis())]
    Timeout { step: Step, limit: Duration },
    #[error("dispatch cancelled")]
    Cancelled,
}

impl RouteFailure {
    /// Metric label.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingRoutingId => "routing_id_missing",
            Self::TenantNotFound { .. } => "tenant_not_found",
            Self::SessionUnavailable { .. } => "session_unavailable",
            Self::MissingTemplateId => "template_id_missing",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::WebhookNotConfigured { .. } => "webhook_not_configured",
            Self::Transport { .. } => "transport",
            Self::Store { .. } => "store",
            Self::Reload { .. } => "reload",
            Self::Feed { .. } => "feed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Failures pointing at an unhealthy collaborator rather than at the
    /// payload or tenant configuration.
    pub const fn is_systemic(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Store { .. }
                | Self::Reload { .. }
                | Self::Feed { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Outcome of routing one entry.
pub type EntryOutcome = Result<Routed, RouteFailure>;

/// Everything one dispatch did, kept for logging and tests.
#[derive(Debug)]
pub struct DispatchReport {
    pub kind: EventKind,
    /// One outcome per routed entry, in entry order. Template status events
    /// carry exactly one outcome; unclassified events carry none.
    pub outcomes: Vec<EntryOutcome>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &RouteFailure> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().err())
    }

    pub fn routed(&self) -> impl Iterator<Item = &Routed> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().ok())
    }
}

/// Acknowledgement returned to the platform for every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchAck {
    pub status: &'static str,
}

impl DispatchAck {
    pub const fn success() -> Self {
        Self { status: "success" }
    }
}
