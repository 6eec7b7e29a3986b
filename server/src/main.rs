//! Messaging Gateway Webhook Router - Main Entry Point

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use mg_server::sessions::{InstanceRegistry, PgSessionLoader, SessionRegistry, TracingInboxConsumer};
use mg_server::webhooks::{DispatchTimeouts, Dispatcher, HttpForwarder, PgStore};
use mg_server::{api, config, db, observability};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    // Initialize tracing and metrics
    let (_otel_guard, meter_provider) = observability::init(&config.observability)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        signatures = config.verifies_signatures(),
        "Starting webhook router"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    // Live sessions for connected instances
    let loader = PgSessionLoader::new(
        db_pool.clone(),
        config.session_inbox_capacity,
        Arc::new(TracingInboxConsumer),
    );
    let registry = Arc::new(InstanceRegistry::new(Arc::new(loader)));
    match registry.reload().await {
        Ok(()) => info!(sessions = registry.len(), "Live sessions loaded"),
        Err(e) => warn!(error = %e, "Initial session load failed; sessions will load on demand"),
    }
    let sessions: Arc<dyn SessionRegistry> = registry;

    // Event router
    let store = Arc::new(PgStore::new(db_pool));
    let forwarder = Arc::new(HttpForwarder::new(
        config.forward_timeout,
        config.forward_allow_private,
    ));
    if config.forward_allow_private {
        warn!("Forwarding to private addresses is enabled");
    }
    let dispatcher = Dispatcher::new(store.clone(), store, forwarder, Arc::clone(&sessions))
        .with_timeouts(DispatchTimeouts::from_config(&config));

    // Build router
    let state = api::AppState::new(config.clone(), dispatcher, sessions);
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            warn!(error = %e, "OTel meter provider shutdown error");
        }
    }

    info!("Server shutdown complete");

    Ok(())
}
