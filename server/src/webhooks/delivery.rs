//! Template Status Forwarding
//!
//! Posts template status changes to the callback URL configured on the
//! template. One attempt per event; the platform's own redelivery is the
//! retry mechanism.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::ssrf;

/// Longest response body excerpt kept in an error.
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("callback target blocked: {0}")]
    Blocked(String),
    #[error("invalid callback URL: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("callback responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Outbound JSON POST used for template status forwards.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST `body` to `url`. Returns the response status on 2xx.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, ForwardError>;
}

/// `reqwest`-backed forwarder that pins each request to the address checked
/// by [`ssrf::resolve_target`]. A 3xx answer is reported as
/// [`ForwardError::Status`] and never followed.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    timeout: Duration,
    allow_private: bool,
}

impl HttpForwarder {
    pub const fn new(timeout: Duration, allow_private: bool) -> Self {
        Self {
            timeout,
            allow_private,
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, ForwardError> {
        let target = ssrf::resolve_target(url, self.allow_private).await?;

        // Per-request client so the connection goes to the address that
        // passed the check, not to a fresh DNS answer. Redirects are not
        // followed: their targets never went through the check.
        let client = reqwest::Client::builder()
            .resolve(&target.host, target.addr)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()?;

        let response = client.post(target.url).json(body).send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Template status forwarded");

        if status.is_success() {
            return Ok(status.as_u16());
        }

        let text = response.text().await.unwrap_or_default();
        Err(ForwardError::Status {
            status: status.as_u16(),
            body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}
