//! Messaging Gateway Webhook Router
//!
//! Receives callbacks from the messaging platform, resolves each one to a
//! tenant instance and either forwards template status changes to the
//! tenant's callback URL or feeds the event into the tenant's live session.

pub mod api;
pub mod config;
pub mod db;
pub mod observability;
pub mod sessions;
pub mod webhooks;
