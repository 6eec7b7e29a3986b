//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `integration` value of instances connected through the business platform.
pub const BUSINESS_INTEGRATION: &str = "WHATSAPP-BUSINESS";

/// Tenant instance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    /// Unique tenant name; also the key of its live session.
    pub name: String,
    /// Platform-assigned phone number identifier.
    pub number: Option<String>,
    pub integration: String,
    pub connection_status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Instance connection state as last persisted by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "connection_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Open,
    Connecting,
    Close,
}

/// Minimal instance projection used in diagnostics.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InstanceSummary {
    pub name: String,
    pub number: Option<String>,
    pub integration: String,
}

impl std::fmt::Display for InstanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.name,
            self.number.as_deref().unwrap_or("-"),
            self.integration
        )
    }
}

/// Message template registered by a tenant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    /// Platform template identifier.
    pub template_id: String,
    pub instance_id: Uuid,
    pub name: String,
    pub language: String,
    /// Where status updates for this template are forwarded.
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Configured callback URL; blank values count as unset.
    pub fn callback_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
