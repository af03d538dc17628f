use secretdrop::{
    config::AppConfig,
    ingest::{IngestQueue, IngestWorker},
    service::SecretService,
    store::{self, SecretStore, SqliteStore},
    web,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging first
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secretdrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Secretdrop v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::init()?;
    info!("Configuration loaded");

    // Initialize database
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("Database connected: {}", config.database.url);

    // Run migrations
    store::init_db(&pool).await?;

    let store: Arc<dyn SecretStore> = Arc::new(SqliteStore::new(pool));
    let service = Arc::new(SecretService::new(store.clone(), &config.secrets));

    // Start the ingestion worker for asynchronous producers
    let (queue, ingest_rx) = IngestQueue::new(config.ingest.queue_capacity);
    tokio::spawn(IngestWorker::new(service.clone(), ingest_rx).run());

    // Eager expiry sweep; access-time checks already hide expired entries
    let sweep_store = store.clone();
    let sweep_interval = Duration::from_secs(config.secrets.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweep_store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Removed expired secrets"),
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    });

    // Create web router
    let state = web::AppState {
        service,
        ingest: queue,
    };
    let app = web::create_router(state);

    let web_addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = TcpListener::bind(&web_addr).await?;
    info!("Web server listening on http://{}", web_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
