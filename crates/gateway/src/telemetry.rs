//! Telemetry ingestion: liveness classification and duplicate suppression.
//!
//! The upstream feed is a passive store that always serves the device's last
//! known sample. A sample is only worth persisting when it is fresh enough
//! that the device is presumed to still be reporting, and only if the exact
//! same upstream sample has not been stored already (the dashboard polls
//! faster than the device pushes).
//!
//! The core logic is written against the `ReadingStore` trait so the
//! idempotence and liveness-boundary properties can be exercised with an
//! in-memory store and a pinned clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use warehouse_feed::{FeedError, FeedSample};

use crate::models::SensorReading;

/// Source of the latest upstream sample. Blocking; callers run it on a
/// blocking worker thread.
pub trait FeedSource: Send + Sync {
    fn latest(&self) -> Result<Option<FeedSample>, FeedError>;
}

impl FeedSource for warehouse_feed::ThingSpeakClient {
    fn latest(&self) -> Result<Option<FeedSample>, FeedError> {
        self.latest_feed()
    }
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn find(
        &self,
        sensor_id: &str,
        recorded_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<SensorReading>>;

    /// Insert a reading; returns `None` when the `(sensor, timestamp)` pair
    /// already exists (lost a race with a concurrent poll).
    async fn insert(
        &self,
        sensor_id: &str,
        sample: &FeedSample,
    ) -> anyhow::Result<Option<SensorReading>>;

    async fn list(&self, sensor_id: &str) -> anyhow::Result<Vec<SensorReading>>;
}

/// Outcome of one ingestion attempt, serialized directly to the dashboard.
#[derive(Debug, Serialize, PartialEq)]
pub struct IngestReport {
    pub live: bool,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SensorReading>,
}

impl IngestReport {
    /// The feed itself had nothing usable: empty channel, unreachable host,
    /// or a payload we could not parse. A normal outcome, never a 5xx.
    pub fn no_data(reason: impl Into<String>) -> Self {
        IngestReport {
            live: false,
            duplicate: false,
            reason: Some(reason.into()),
            data: None,
        }
    }

    fn stale() -> Self {
        IngestReport {
            live: false,
            duplicate: false,
            reason: None,
            data: None,
        }
    }

    fn duplicate() -> Self {
        IngestReport {
            live: true,
            duplicate: true,
            reason: None,
            data: None,
        }
    }

    fn stored(reading: SensorReading) -> Self {
        IngestReport {
            live: true,
            duplicate: false,
            reason: None,
            data: Some(reading),
        }
    }
}

/// A sensor is live iff its last sample is no older than the liveness window.
pub fn is_live(now: DateTime<Utc>, recorded_at: DateTime<Utc>, window: Duration) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(recorded_at) <= window
}

/// Classify and persist one already-fetched sample.
///
/// Repeated calls with the same upstream sample never store a second row:
/// the first call inserts, every later call reports a duplicate.
pub async fn ingest_sample<S: ReadingStore + ?Sized>(
    store: &S,
    sensor_id: &str,
    sample: FeedSample,
    now: DateTime<Utc>,
    window: Duration,
) -> anyhow::Result<IngestReport> {
    if !is_live(now, sample.recorded_at, window) {
        return Ok(IngestReport::stale());
    }

    if store.find(sensor_id, sample.recorded_at).await?.is_some() {
        return Ok(IngestReport::duplicate());
    }

    match store.insert(sensor_id, &sample).await? {
        Some(reading) => Ok(IngestReport::stored(reading)),
        None => Ok(IngestReport::duplicate()),
    }
}

/// Postgres-backed store; the unique `(sensor_id, recorded_at)` index backs
/// the duplicate suppression even under concurrent polls.
pub struct PgReadingStore {
    pool: sqlx::PgPool,
}

impl PgReadingStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        PgReadingStore { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn find(
        &self,
        sensor_id: &str,
        recorded_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<SensorReading>> {
        let row = sqlx::query_as::<_, SensorReading>(
            "SELECT * FROM sensor_readings WHERE sensor_id = $1 AND recorded_at = $2",
        )
        .bind(sensor_id)
        .bind(recorded_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(
        &self,
        sensor_id: &str,
        sample: &FeedSample,
    ) -> anyhow::Result<Option<SensorReading>> {
        let row = sqlx::query_as::<_, SensorReading>(
            "INSERT INTO sensor_readings (sensor_id, temperature, humidity, ldr_value, recorded_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (sensor_id, recorded_at) DO NOTHING \
             RETURNING *",
        )
        .bind(sensor_id)
        .bind(sample.temperature)
        .bind(sample.humidity)
        .bind(sample.ldr_value)
        .bind(sample.recorded_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, sensor_id: &str) -> anyhow::Result<Vec<SensorReading>> {
        let rows = sqlx::query_as::<_, SensorReading>(
            "SELECT * FROM sensor_readings WHERE sensor_id = $1 ORDER BY recorded_at ASC",
        )
        .bind(sensor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MemoryStore {
        rows: Mutex<Vec<SensorReading>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            MemoryStore { rows: Mutex::new(Vec::new()) }
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReadingStore for MemoryStore {
        async fn find(
            &self,
            sensor_id: &str,
            recorded_at: DateTime<Utc>,
        ) -> anyhow::Result<Option<SensorReading>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.sensor_id == sensor_id && r.recorded_at == recorded_at)
                .cloned())
        }

        async fn insert(
            &self,
            sensor_id: &str,
            sample: &FeedSample,
        ) -> anyhow::Result<Option<SensorReading>> {
            let mut rows = self.rows.lock().unwrap();
            if rows
                .iter()
                .any(|r| r.sensor_id == sensor_id && r.recorded_at == sample.recorded_at)
            {
                return Ok(None);
            }
            let reading = SensorReading {
                id: rows.len() as i64 + 1,
                sensor_id: sensor_id.to_string(),
                temperature: sample.temperature,
                humidity: sample.humidity,
                ldr_value: sample.ldr_value,
                recorded_at: sample.recorded_at,
            };
            rows.push(reading.clone());
            Ok(Some(reading))
        }

        async fn list(&self, sensor_id: &str) -> anyhow::Result<Vec<SensorReading>> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.sensor_id == sensor_id)
                .cloned()
                .collect();
            out.sort_by_key(|r| r.recorded_at);
            Ok(out)
        }
    }

    fn sample_at(recorded_at: DateTime<Utc>) -> FeedSample {
        FeedSample {
            recorded_at,
            temperature: 24.0,
            humidity: 58.5,
            ldr_value: 301.0,
        }
    }

    const WINDOW: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn repeated_ingestion_of_one_sample_stores_exactly_one_row() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sample = sample_at(now - chrono::Duration::seconds(10));

        let first = ingest_sample(&store, "s1", sample.clone(), now, WINDOW).await.unwrap();
        assert!(first.live);
        assert!(!first.duplicate);
        assert_eq!(first.data.as_ref().unwrap().recorded_at, sample.recorded_at);

        let second = ingest_sample(&store, "s1", sample.clone(), now, WINDOW).await.unwrap();
        assert!(second.live);
        assert!(second.duplicate);
        assert!(second.data.is_none());

        let third = ingest_sample(&store, "s1", sample, now, WINDOW).await.unwrap();
        assert!(third.duplicate);

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stale_sample_is_not_live_and_not_stored() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sample = sample_at(now - chrono::Duration::seconds(121));

        let report = ingest_sample(&store, "s1", sample, now, WINDOW).await.unwrap();
        assert!(!report.live);
        assert!(!report.duplicate);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn fresh_sample_is_live_and_stored() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sample = sample_at(now - chrono::Duration::seconds(1));

        let report = ingest_sample(&store, "s1", sample, now, WINDOW).await.unwrap();
        assert!(report.live);
        assert!(report.data.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn same_timestamp_on_different_sensors_is_not_a_duplicate() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ts = now - chrono::Duration::seconds(5);

        ingest_sample(&store, "s1", sample_at(ts), now, WINDOW).await.unwrap();
        let report = ingest_sample(&store, "s2", sample_at(ts), now, WINDOW).await.unwrap();
        assert!(!report.duplicate);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn liveness_window_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(is_live(now, now - chrono::Duration::seconds(120), WINDOW));
        assert!(!is_live(now, now - chrono::Duration::seconds(121), WINDOW));
        // a clock-skewed future timestamp still counts as live
        assert!(is_live(now, now + chrono::Duration::seconds(30), WINDOW));
    }

    #[tokio::test]
    async fn reports_compare_by_value_including_stored_data() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sample = sample_at(now - chrono::Duration::seconds(2));

        let report = ingest_sample(&store, "s1", sample, now, WINDOW).await.unwrap();
        let stored = store.find("s1", report.data.as_ref().unwrap().recorded_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report, IngestReport::stored(stored));
        assert_ne!(report, IngestReport::no_data("no data"));
    }

    #[test]
    fn no_data_report_serializes_with_a_reason() {
        let json = serde_json::to_value(IngestReport::no_data("no data")).unwrap();
        assert_eq!(json, serde_json::json!({ "live": false, "duplicate": false, "reason": "no data" }));
    }
}
