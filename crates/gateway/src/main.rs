use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warehouse_feed::ThingSpeakClient;
use warehouse_gateway::config::Config;
use warehouse_gateway::telemetry::PgReadingStore;
use warehouse_gateway::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Connected to database, schema provisioned.");

    let feed = ThingSpeakClient::new(
        config.channel_id.clone(),
        config.read_api_key.clone(),
        config.feed_timeout,
    );
    let readings = PgReadingStore::new(pool.clone());

    let port = config.port;
    let state = Arc::new(AppState {
        db: pool,
        config,
        feed: Arc::new(feed),
        readings: Arc::new(readings),
    });

    let router = app(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Warehouse gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
