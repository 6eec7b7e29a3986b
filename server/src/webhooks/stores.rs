//! Template and Instance Stores
//!
//! Lookup interfaces the dispatcher resolves against, and their `PostgreSQL`
//! implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::db::{self, Instance, InstanceSummary, Template};

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of message templates by platform identifier.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_template(&self, template_id: &str) -> Result<Option<Template>, StoreError>;
}

/// Lookup of tenant instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Instance registered for a platform number id.
    async fn find_instance_by_number(&self, number: &str) -> Result<Option<Instance>, StoreError>;

    /// Every persisted instance, for diagnostics when a lookup misses.
    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, StoreError>;
}

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgStore {
    async fn find_template(&self, template_id: &str) -> Result<Option<Template>, StoreError> {
        Ok(db::find_template_by_template_id(&self.pool, template_id).await?)
    }
}

#[async_trait]
impl InstanceStore for PgStore {
    async fn find_instance_by_number(&self, number: &str) -> Result<Option<Instance>, StoreError> {
        Ok(db::find_instance_by_number(&self.pool, number).await?)
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, StoreError> {
        Ok(db::list_instances(&self.pool).await?)
    }
}
