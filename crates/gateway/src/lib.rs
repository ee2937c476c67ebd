//! Onion-warehouse management API: accounts, shops, inventory boxes with
//! maintenance-alert schedules, billing, and sensor telemetry ingestion.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod alerts;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod telemetry;

use config::Config;
use telemetry::{FeedSource, ReadingStore};

pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub feed: Arc<dyn FeedSource>,
    pub readings: Arc<dyn ReadingStore>,
}

pub fn app(state: Arc<AppState>) -> anyhow::Result<Router> {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin: {e}"))?;

    // credentialed CORS: the session cookie must survive the browser
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let router = Router::new()
        .route("/readyz", get(health_check))
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/profile", get(handlers::auth::profile))
        .route("/api/auth/update", put(handlers::auth::update_profile))
        .route("/api/shops", get(handlers::shops::list_shops).post(handlers::shops::create_shop))
        .route(
            "/api/shops/:id",
            put(handlers::shops::update_shop).delete(handlers::shops::delete_shop),
        )
        .route("/api/boxes", get(handlers::boxes::list_boxes).post(handlers::boxes::create_box))
        .route(
            "/api/boxes/:id",
            put(handlers::boxes::update_box).delete(handlers::boxes::delete_box),
        )
        .route("/api/boxes/:id/alert", put(handlers::boxes::update_alert))
        .route("/api/bills", get(handlers::bills::list_bills).post(handlers::bills::create_bill))
        .route("/api/thingspeak/fetch/:sensor_id", get(handlers::telemetry::fetch_and_ingest))
        .route("/api/thingspeak/sensor/:sensor_id", get(handlers::telemetry::list_readings))
        .layer(cors)
        .with_state(state);

    Ok(router)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "warehouse-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
