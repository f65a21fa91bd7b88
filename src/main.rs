//! Book Catalog Server
//!
//! Serves the catalog API and consumes loan events from the loan-management system.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use book_catalog::{
    api,
    config::AppConfig,
    queue::{self, ConsumerSettings, LoanEventConsumer, MessageQueue, QueueError},
    repository::{BookStore, PgBookStore},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("book_catalog={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Book Catalog v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.statement_timeout())
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let store: Arc<dyn BookStore> = Arc::new(PgBookStore::new(pool));
    let services = Services::new(store, config.database.statement_timeout());

    // Each consumer gets its own queue connection; a pending receive holds it.
    let settings = ConsumerSettings::from(&config.queue);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = Vec::new();
    for queue_name in [
        config.queue.loan_finished_queue.clone(),
        config.queue.loan_created_queue.clone(),
    ] {
        let transport = connect_queue(&config.queue.url, &settings).await?;
        let consumer = LoanEventConsumer::new(
            queue_name,
            transport,
            services.reconciler.clone(),
            settings.clone(),
        );
        tracing::info!(queue = consumer.queue_name(), "Starting loan event consumer");
        consumers.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    for handle in consumers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Loan event consumer failed: {}", e),
            Err(e) => tracing::error!("Loan event consumer panicked: {}", e),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Connect to the queue server, retrying with capped exponential backoff
async fn connect_queue(
    url: &str,
    settings: &ConsumerSettings,
) -> anyhow::Result<Arc<dyn MessageQueue>> {
    let mut attempt: u32 = 0;
    let mut backoff = settings.initial_backoff;
    loop {
        match queue::connect(url).await {
            Ok(transport) => {
                tracing::info!("Connected to queue server");
                return Ok(transport);
            }
            Err(e @ QueueError::UnsupportedScheme(_)) => return Err(e.into()),
            Err(e) => {
                attempt += 1;
                if settings.max_reconnect_attempts > 0 && attempt >= settings.max_reconnect_attempts {
                    return Err(e.into());
                }
                tracing::warn!(attempt, "Queue server unreachable, retrying in {:?}: {}", backoff, e);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(settings.max_backoff);
            }
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM and tell the consumers to stop
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
