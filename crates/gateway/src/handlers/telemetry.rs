use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::task;

use crate::error::ApiError;
use crate::models::SensorReading;
use crate::telemetry::{ingest_sample, IngestReport};
use crate::AppState;

/// Poll the upstream feed once and persist the sample if the sensor is live
/// and the sample is new. An empty or unreachable feed is a normal business
/// outcome, reported as `live: false` with a reason.
pub async fn fetch_and_ingest(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<IngestReport>, ApiError> {
    let feed = Arc::clone(&state.feed);
    let fetched = task::spawn_blocking(move || feed.latest())
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("feed worker failed")))?;

    let sample = match fetched {
        Ok(Some(sample)) => sample,
        Ok(None) => return Ok(Json(IngestReport::no_data("no data"))),
        Err(e) => {
            tracing::warn!("feed fetch for {} failed: {}", sensor_id, e);
            return Ok(Json(IngestReport::no_data("feed unavailable")));
        }
    };

    let report = ingest_sample(
        state.readings.as_ref(),
        &sensor_id,
        sample,
        Utc::now(),
        state.config.liveness_window,
    )
    .await
    .map_err(ApiError::Internal)?;

    Ok(Json(report))
}

/// All stored readings for one sensor, oldest first, for charting.
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Vec<SensorReading>>, ApiError> {
    let readings = state
        .readings
        .list(&sensor_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(readings))
}
