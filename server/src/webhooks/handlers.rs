//! Webhook HTTP Handlers
//!
//! Subscription handshake and event delivery endpoints called by the
//! messaging platform.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bytes::Bytes;
use mg_common::InboundEvent;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument as _};

use super::signing::{self, SIGNATURE_HEADER};
use super::types::DispatchAck;
use crate::api::AppState;

/// Query parameters of the subscription handshake.
#[derive(Debug, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhook/meta
///
/// Echoes `hub.challenge` when the platform presents the configured verify
/// token. Without a configured token every handshake is refused.
#[instrument(skip(state, query))]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<VerificationQuery>,
) -> Result<String, (StatusCode, String)> {
    let accepted = query.mode.as_deref() == Some("subscribe")
        && match (state.config.verify_token.as_deref(), query.verify_token.as_deref()) {
            (Some(expected), Some(presented)) => signing::tokens_match(expected, presented),
            _ => false,
        };

    if !accepted {
        warn!("Webhook subscription handshake refused");
        return Err((StatusCode::FORBIDDEN, "Verification failed".to_string()));
    }

    info!("Webhook subscription verified");
    Ok(query.challenge.unwrap_or_default())
}

/// POST /webhook/meta
///
/// Verifies the payload signature when an app secret is configured, decodes
/// the event and dispatches it. Routing failures never change the response.
#[instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DispatchAck>, (StatusCode, String)> {
    if let Some(secret) = state.config.app_secret.as_deref() {
        let presented = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = signing::verify_signature_header(secret, &body, presented) {
            warn!(error = %e, "Rejected webhook delivery");
            return Err((StatusCode::UNAUTHORIZED, e.to_string()));
        }
    }

    debug!(raw_event = %String::from_utf8_lossy(&body), "Webhook event received");

    let event: InboundEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Undecodable webhook body");
        (StatusCode::BAD_REQUEST, format!("Invalid event body: {e}"))
    })?;

    // Dropping this handler (client disconnect) cancels the dispatch; side
    // effects already completed are kept.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let dispatcher = Arc::clone(&state.dispatcher);
    let handle = tokio::spawn(
        async move { dispatcher.dispatch(event, &cancel).await }.in_current_span(),
    );

    let ack = match handle.await {
        Ok(ack) => ack,
        Err(e) => {
            error!(error = %e, "Dispatch task failed");
            DispatchAck::success()
        }
    };

    Ok(Json(ack))
}
