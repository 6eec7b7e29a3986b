//! Instance and Template Queries
//!
//! Uses runtime queries (`sqlx::query` / `sqlx::query_as`) to avoid
//! requiring a live database at compile time.

use sqlx::PgPool;
use uuid::Uuid;

use super::models::{ConnectionStatus, Instance, InstanceSummary, Template, BUSINESS_INTEGRATION};

/// Find a template by its platform identifier.
pub async fn find_template_by_template_id(
    pool: &PgPool,
    template_id: &str,
) -> sqlx::Result<Option<Template>> {
    sqlx::query_as::<_, Template>(
        r"
        SELECT id, template_id, instance_id, name, language, webhook_url, created_at, updated_at
        FROM templates
        WHERE template_id = $1
        ",
    )
    .bind(template_id)
    .fetch_optional(pool)
    .await
}

/// Find the instance registered for a platform number id.
///
/// Numbers should be unique among tenants; if they are not, the oldest
/// instance wins.
pub async fn find_instance_by_number(pool: &PgPool, number: &str) -> sqlx::Result<Option<Instance>> {
    sqlx::query_as::<_, Instance>(
        r"
        SELECT id, name, number, integration, connection_status, created_at, updated_at
        FROM instances
        WHERE number = $1
        ORDER BY created_at ASC
        LIMIT 1
        ",
    )
    .bind(number)
    .fetch_optional(pool)
    .await
}

/// List every persisted instance (name, number, integration).
pub async fn list_instances(pool: &PgPool) -> sqlx::Result<Vec<InstanceSummary>> {
    sqlx::query_as::<_, InstanceSummary>(
        "SELECT name, number, integration FROM instances ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// List business-platform instances whose connection is open.
pub async fn list_connected_instances(pool: &PgPool) -> sqlx::Result<Vec<Instance>> {
    sqlx::query_as::<_, Instance>(
        r"
        SELECT id, name, number, integration, connection_status, created_at, updated_at
        FROM instances
        WHERE integration = $1 AND connection_status = 'open'
        ORDER BY name
        ",
    )
    .bind(BUSINESS_INTEGRATION)
    .fetch_all(pool)
    .await
}

/// Create an instance.
pub async fn create_instance(
    pool: &PgPool,
    name: &str,
    number: Option<&str>,
    integration: &str,
    connection_status: ConnectionStatus,
) -> sqlx::Result<Instance> {
    sqlx::query_as::<_, Instance>(
        r"
        INSERT INTO instances (id, name, number, integration, connection_status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, number, integration, connection_status, created_at, updated_at
        ",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .bind(number)
    .bind(integration)
    .bind(connection_status)
    .fetch_one(pool)
    .await
}

/// Create a template owned by an instance.
pub async fn create_template(
    pool: &PgPool,
    instance_id: Uuid,
    template_id: &str,
    name: &str,
    language: &str,
    webhook_url: Option<&str>,
) -> sqlx::Result<Template> {
    sqlx::query_as::<_, Template>(
        r"
        INSERT INTO templates (id, template_id, instance_id, name, language, webhook_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, template_id, instance_id, name, language, webhook_url, created_at, updated_at
        ",
    )
    .bind(Uuid::now_v7())
    .bind(template_id)
    .bind(instance_id)
    .bind(name)
    .bind(language)
    .bind(webhook_url)
    .fetch_one(pool)
    .await
}

/// Update an instance's connection status. Returns `false` if no such instance.
pub async fn set_connection_status(
    pool: &PgPool,
    name: &str,
    status: ConnectionStatus,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE instances SET connection_status = $2, updated_at = NOW() WHERE name = $1",
    )
    .bind(name)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
