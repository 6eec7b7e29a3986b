//! Webhook Event Dispatch
//!
//! Classifies an inbound event, resolves each entry to its tenant and either
//! forwards template status changes or feeds message traffic into the
//! tenant's live session. Per-entry failures are contained in the
//! [`DispatchReport`]; the platform always receives a success acknowledgement.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mg_common::{Entry, InboundEvent, MessageValue, TemplateStatusChange};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::delivery::Forwarder;
use super::stores::{InstanceStore, TemplateStore};
use super::types::{
    DispatchAck, DispatchReport, EntryOutcome, EventKind, RouteFailure, Routed, Step,
};
use crate::config::Config;
use crate::observability::metrics;
use crate::sessions::{LiveSession, SessionRegistry};

/// Upper bounds on each collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimeouts {
    pub lookup: Duration,
    pub reload: Duration,
    pub feed: Duration,
    pub forward: Duration,
}

impl DispatchTimeouts {
    pub const fn from_config(config: &Config) -> Self {
        Self {
            lookup: config.lookup_timeout,
            reload: config.reload_timeout,
            feed: config.feed_timeout,
            forward: config.forward_timeout,
        }
    }
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(2),
            reload: Duration::from_secs(10),
            feed: Duration::from_secs(5),
            forward: Duration::from_secs(10),
        }
    }
}

/// Stateless router over injected collaborators. Safe to share across
/// concurrent deliveries.
#[derive(Clone)]
pub struct Dispatcher {
    templates: Arc<dyn TemplateStore>,
    instances: Arc<dyn InstanceStore>,
    forwarder: Arc<dyn Forwarder>,
    sessions: Arc<dyn SessionRegistry>,
    timeouts: DispatchTimeouts,
}

impl Dispatcher {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        instances: Arc<dyn InstanceStore>,
        forwarder: Arc<dyn Forwarder>,
        sessions: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            templates,
            instances,
            forwarder,
            sessions,
            timeouts: DispatchTimeouts::default(),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: DispatchTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Route one delivery and acknowledge it.
    ///
    /// Never fails: every outcome is logged and counted, then dropped.
    #[instrument(skip_all, fields(object = %event.kind, entries = event.entries.len()))]
    pub async fn dispatch(&self, event: InboundEvent, cancel: &CancellationToken) -> DispatchAck {
        let report = self.dispatch_detailed(Arc::new(event), cancel).await;
        log_report(&report);
        DispatchAck::success()
    }

    /// Route one delivery and return what happened to each entry.
    pub async fn dispatch_detailed(
        &self,
        event: Arc<InboundEvent>,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        if !event.is_account_event() {
            debug!(object = %event.kind, "Ignoring event from unrelated object");
            return DispatchReport {
                kind: EventKind::Unclassified,
                outcomes: Vec::new(),
            };
        }

        if event.is_template_status() {
            // Remaining entries are not routed.
            let outcome = match event.first_change() {
                Some(change) => self.forward_template_status(&change.value, cancel).await,
                None => Err(RouteFailure::MissingTemplateId),
            };
            return DispatchReport {
                kind: EventKind::TemplateStatus,
                outcomes: vec![outcome],
            };
        }

        let outcomes = join_all(
            event
                .entries
                .iter()
                .map(|entry| self.route_entry(entry, &event, cancel)),
        )
        .await;

        DispatchReport {
            kind: EventKind::Messages,
            outcomes,
        }
    }

    async fn forward_template_status(
        &self,
        value: &Value,
        cancel: &CancellationToken,
    ) -> EntryOutcome {
        let change =
            TemplateStatusChange::from_value(value).map_err(|_| RouteFailure::MissingTemplateId)?;
        let TemplateStatusChange {
            template_id,
            status: template_status,
        } = change;

        let template = bounded(
            Step::TemplateLookup,
            self.timeouts.lookup,
            cancel,
            self.templates.find_template(&template_id),
        )
        .await?
        .map_err(|source| RouteFailure::Store {
            step: Step::TemplateLookup,
            source,
        })?;

        let Some(template) = template else {
            return Err(RouteFailure::TemplateNotFound { template_id });
        };

        let Some(url) = template.callback_url().map(str::to_owned) else {
            return Err(RouteFailure::WebhookNotConfigured { template_id });
        };

        let result = bounded(
            Step::Forward,
            self.timeouts.forward,
            cancel,
            self.forwarder.post_json(&url, value),
        )
        .await?;

        match result {
            Ok(status) => Ok(Routed::Forwarded {
                template_id,
                template_status,
                url,
                status,
            }),
            Err(source) => Err(RouteFailure::Transport {
                template_id,
                url,
                source,
            }),
        }
    }

    async fn route_entry(
        &self,
        entry: &Entry,
        event: &Arc<InboundEvent>,
        cancel: &CancellationToken,
    ) -> EntryOutcome {
        let number = entry
            .first_change()
            .and_then(|change| MessageValue::from_value(&change.value).ok())
            .and_then(|value| value.routing_id().map(str::to_owned))
            .ok_or(RouteFailure::MissingRoutingId)?;

        let instance = bounded(
            Step::InstanceLookup,
            self.timeouts.lookup,
            cancel,
            self.instances.find_instance_by_number(&number),
        )
        .await?
        .map_err(|source| RouteFailure::Store {
            step: Step::InstanceLookup,
            source,
        })?;

        let Some(instance) = instance else {
            self.log_known_instances(&number, cancel).await;
            return Err(RouteFailure::TenantNotFound { number });
        };
        let name = instance.name;

        if let Some(session) = self.sessions.get(&name) {
            return self.feed(session, name, event, false, cancel).await;
        }

        warn!(
            instance = %name,
            live_sessions = ?self.sessions.names(),
            "No live session for instance, reloading sessions"
        );

        bounded(
            Step::SessionReload,
            self.timeouts.reload,
            cancel,
            self.sessions.reload(),
        )
        .await?
        .map_err(|source| RouteFailure::Reload {
            instance: name.clone(),
            source,
        })?;

        match self.sessions.get(&name) {
            Some(session) => self.feed(session, name, event, true, cancel).await,
            None => Err(RouteFailure::SessionUnavailable { instance: name }),
        }
    }

    async fn feed(
        &self,
        session: Arc<dyn LiveSession>,
        instance: String,
        event: &Arc<InboundEvent>,
        after_reload: bool,
        cancel: &CancellationToken,
    ) -> EntryOutcome {
        let result = bounded(
            Step::FeedEvent,
            self.timeouts.feed,
            cancel,
            session.feed_event(Arc::clone(event)),
        )
        .await?;

        match result {
            Ok(()) => {
                metrics::record_event_fed();
                Ok(Routed::Fed {
                    instance,
                    after_reload,
                })
            }
            Err(source) => Err(RouteFailure::Feed { instance, source }),
        }
    }

    /// Diagnostics for an unknown routing id. Lookup failures here are not
    /// attributed to the entry.
    async fn log_known_instances(&self, number: &str, cancel: &CancellationToken) {
        let listed = bounded(
            Step::InstanceLookup,
            self.timeouts.lookup,
            cancel,
            self.instances.list_instances(),
        )
        .await;

        match listed {
            Ok(Ok(instances)) => {
                let known: Vec<String> = instances.iter().map(ToString::to_string).collect();
                info!(
                    number = %number,
                    known_instances = ?known,
                    "No instance registered for routing identifier"
                );
            }
            Ok(Err(e)) => debug!(error = %e, "Failed to list instances"),
            Err(e) => debug!(error = %e, "Instance listing skipped"),
        }
    }
}

/// Run one collaborator call under the step's time limit, giving up early
/// when the delivery is cancelled.
async fn bounded<F: Future>(
    step: Step,
    limit: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<F::Output, RouteFailure> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RouteFailure::Cancelled),
        result = tokio::time::timeout(limit, call) => {
            result.map_err(|_| RouteFailure::Timeout { step, limit })
        }
    }
}

fn log_report(report: &DispatchReport) {
    metrics::record_webhook_event(report.kind.as_str());

    for (index, outcome) in report.outcomes.iter().enumerate() {
        match outcome {
            Ok(Routed::Forwarded {
                template_id,
                template_status,
                url,
                status,
            }) => {
                metrics::record_template_forward("delivered");
                info!(
                    template_id = %template_id,
                    template_status = template_status.as_deref().unwrap_or("unknown"),
                    url = %url,
                    status,
                    "Template status forwarded"
                );
            }
            Ok(Routed::Fed {
                instance,
                after_reload,
            }) => {
                debug!(entry = index, instance = %instance, after_reload, "Event fed to session");
            }
            Err(failure) => {
                metrics::record_route_failure(failure.reason());
                if report.kind == EventKind::TemplateStatus {
                    metrics::record_template_forward(if failure.is_systemic() {
                        "failed"
                    } else {
                        "skipped"
                    });
                }

                if failure.is_systemic() {
                    error!(entry = index, reason = failure.reason(), error = %failure, "Entry not routed");
                } else {
                    warn!(entry = index, reason = failure.reason(), error = %failure, "Entry not routed");
                }
            }
        }
    }
}
