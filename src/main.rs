//! subscription-sync server
//!
//! Wires the Postgres stores, the Stripe adapter and the association sync
//! worker behind the billing HTTP router.

use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_sync::adapters::events::{BroadcastChargeEventPublisher, ChargeEventLogger};
use subscription_sync::adapters::http::{billing_router, BillingAppState};
use subscription_sync::adapters::postgres::{
    PostgresAssociationRepository, PostgresChargeRepository, PostgresUserRepository,
};
use subscription_sync::adapters::stripe::{StripeBillingAdapter, StripeConfig};
use subscription_sync::adapters::tasks::{
    AssociationSyncWorker, AssociationSyncWorkerConfig, ChannelAssociationQueue,
};
use subscription_sync::config::{AppConfig, ConfigError, ValidationError};
use subscription_sync::domain::billing::StripeWebhookVerifier;
use subscription_sync::ports::{AssociationRepository, ProviderError};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stripe client setup failed: {0}")]
    Stripe(#[from] ProviderError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Configuration
    let config = AppConfig::load()?;
    config.validate()?;

    // 2. Logging
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.server.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        payment_mode = config.payment.mode.as_str(),
        "Starting subscription-sync"
    );

    // 3. Database
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    // 4. Stripe
    let stripe = StripeBillingAdapter::new(StripeConfig::from_payment_config(&config.payment)?)?;
    let webhook_secret = config
        .payment
        .active_webhook_secret()
        .ok_or(ValidationError::MissingRequired("payment.webhook_secret"))?;
    let verifier = StripeWebhookVerifier::new(SecretString::new(webhook_secret.to_string()));

    // 5. Association sync worker
    let associations: Arc<dyn AssociationRepository> =
        Arc::new(PostgresAssociationRepository::new(pool.clone()));
    let (queue, tasks) = ChannelAssociationQueue::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = AssociationSyncWorker::with_config(
        associations.clone(),
        AssociationSyncWorkerConfig::from(&config.association_sync),
    );
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(tasks, worker_shutdown).await });

    // 6. Charge events
    let charge_events = BroadcastChargeEventPublisher::new();
    let logger_handle = tokio::spawn(ChargeEventLogger::run(charge_events.subscribe(), shutdown_rx));

    // 7. HTTP
    let state = BillingAppState {
        charges: Arc::new(PostgresChargeRepository::new(pool.clone())),
        users: Arc::new(PostgresUserRepository::new(pool.clone())),
        associations,
        provider: Arc::new(stripe),
        association_queue: Arc::new(queue),
        charge_events: Arc::new(charge_events),
        webhook_verifier: Arc::new(verifier),
    };
    let app = billing_router()
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the worker drain what is already queued
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Association sync worker panicked");
    }
    if let Err(e) = logger_handle.await {
        tracing::error!(error = %e, "Charge event logger panicked");
    }
    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
