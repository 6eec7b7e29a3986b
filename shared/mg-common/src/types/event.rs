//! Inbound Webhook Event Types
//!
//! The platform delivers one JSON document per callback:
//! `{ "object": ..., "entry": [ { "changes": [ { "field": ..., "value": ... } ] } ] }`.
//! Members the router does not read are kept in `extra` so the event handed to a
//! live session serializes back to what the platform sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// `object` value of events that belong to a business account.
pub const ACCOUNT_EVENT_OBJECT: &str = "whatsapp_business_account";

/// `field` value of template approval-state notifications.
pub const TEMPLATE_STATUS_FIELD: &str = "message_template_status_update";

/// Decoded webhook body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Event kind discriminator.
    #[serde(rename = "object", default)]
    pub kind: String,
    /// Entries carried by this delivery.
    #[serde(rename = "entry", default)]
    pub entries: Vec<Entry>,
    /// Members not interpreted by the router.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Changes reported for this entry.
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Members not interpreted by the router (e.g. the account `id`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single change notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Change discriminator.
    #[serde(default)]
    pub field: String,
    /// Change payload, opaque until a route reads it.
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    /// Whether this event comes from a business account.
    pub fn is_account_event(&self) -> bool {
        self.kind == ACCOUNT_EVENT_OBJECT
    }

    /// First change of the first entry, if any.
    pub fn first_change(&self) -> Option<&Change> {
        self.entries.first().and_then(Entry::first_change)
    }

    /// Whether the first change is a template status notification.
    pub fn is_template_status(&self) -> bool {
        self.first_change()
            .is_some_and(|change| change.field == TEMPLATE_STATUS_FIELD)
    }
}

impl Entry {
    /// First change of this entry. Routing only ever consults this one.
    pub fn first_change(&self) -> Option<&Change> {
        self.changes.first()
    }
}

/// Template approval-state change read from a change `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStatusChange {
    /// Platform template identifier, normalised to a string.
    pub template_id: String,
    /// New state (`event` on the wire, `status` in older payloads).
    pub status: Option<String>,
}

impl TemplateStatusChange {
    /// Read the template identifier and new state from a change value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or(Error::NotAnObject("change value"))?;
        let template_id = object
            .get("message_template_id")
            .and_then(id_string)
            .ok_or(Error::MissingField("message_template_id"))?;

        Ok(Self {
            template_id,
            status: object
                .get("event")
                .or_else(|| object.get("status"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }
}

/// Routing view of a message change `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageValue {
    /// `metadata.phone_number_id`, normalised to a string.
    pub phone_number_id: Option<String>,
}

impl MessageValue {
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::NotAnObject("change value"));
        }

        Ok(Self {
            phone_number_id: value.pointer("/metadata/phone_number_id").and_then(id_string),
        })
    }

    /// Routing identifier, if the payload carries one.
    pub fn routing_id(&self) -> Option<&str> {
        self.phone_number_id.as_deref()
    }
}

/// Platform identifiers arrive as strings or as JSON numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
