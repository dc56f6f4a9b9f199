use std::sync::Arc;

use axum::{routing::get, Router};
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardvault::api::AppState;
use cardvault::config::Config;
use cardvault::db;
use cardvault::services::key_vault::KeyVault;
use cardvault::services::number_index::NumberIndex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardvault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cardvault server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Key material is decoded once here; requests never touch the config strings.
    let key_vault = Arc::new(KeyVault::new(config.master_key_bytes()?)?);
    let number_index = Arc::new(NumberIndex::new(&config.index_hmac_key_bytes()?));

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Daily expiration sweep
    let scheduler = JobScheduler::new().await?;
    let sweep_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_id, _sched| {
            let pool = sweep_pool.clone();
            Box::pin(async move {
                cardvault::jobs::expiration_sweep::run(&pool).await;
            })
        })?)
        .await?;
    scheduler.start().await?;
    tracing::info!("Expiration sweep scheduled");

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        key_vault,
        number_index,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(cardvault::api::cards::router())
        .merge(cardvault::api::users::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
