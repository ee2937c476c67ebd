// Maintenance-alert lifecycle and telemetry ingestion, driven end to end
// through the library API with an in-memory reading store and pinned clocks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use warehouse_feed::FeedSample;
use warehouse_gateway::alerts::{AlertAction, AlertStatus, MaintenanceSchedule};
use warehouse_gateway::models::SensorReading;
use warehouse_gateway::telemetry::{ingest_sample, ReadingStore};

const WINDOW: StdDuration = StdDuration::from_secs(120);

struct MemoryStore {
    rows: Mutex<Vec<SensorReading>>,
}

impl MemoryStore {
    fn new() -> Self {
        MemoryStore { rows: Mutex::new(Vec::new()) }
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

#[test]
fn a_box_schedule_walks_through_its_whole_lifetime() {
    let created = DateTime::parse_from_rfc3339("2026-02-01T06:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let mut schedule = MaintenanceSchedule::new(created);

    // nothing due during the first quiet stretch
    assert!(schedule.due_alert(created + Duration::days(10)).is_none());

    // day 13: the 15-day reminder surfaces (notify lead is 2 days)
    let day13 = created + Duration::days(13);
    assert_eq!(schedule.due_alert(day13).unwrap().days, 15);

    // the user snoozes it; it goes quiet for a day, then comes back
    schedule.apply(15, AlertAction::Remind, day13).unwrap();
    assert!(schedule.due_alert(day13 + Duration::hours(12)).is_none());
    assert_eq!(schedule.due_alert(day13 + Duration::days(1)).unwrap().days, 15);

    // the user completes the milestone; the next one takes over later
    let day16 = created + Duration::days(16);
    schedule.apply(15, AlertAction::Completed, day16).unwrap();
    assert!(schedule.due_alert(day16).is_none());

    let day29 = created + Duration::days(29);
    assert_eq!(schedule.due_alert(day29).unwrap().days, 30);

    // completing everything silences the schedule for good
    schedule.apply(30, AlertAction::Completed, day29).unwrap();
    schedule.apply(60, AlertAction::Completed, day29).unwrap();
    assert!(schedule.due_alert(created + Duration::days(400)).is_none());
    assert_eq!(schedule.day15.status, AlertStatus::Completed);
}

#[tokio::test]
async fn polling_faster_than_the_device_reports_stays_idempotent() {
    let store = MemoryStore::new();
    let now = Utc::now();

    // the device pushed one sample; the dashboard polls three times
    let sample = FeedSample {
        recorded_at: now - Duration::seconds(30),
        temperature: 22.1,
        humidity: 64.0,
        ldr_value: 480.0,
    };

    let mut duplicate_flags = Vec::new();
    for _ in 0..3 {
        let report = ingest_sample(&store, "warehouse-1", sample.clone(), now, WINDOW)
            .await
            .unwrap();
        assert!(report.live);
        duplicate_flags.push(report.duplicate);
    }
    assert_eq!(duplicate_flags, vec![false, true, true]);
    assert_eq!(store.list("warehouse-1").await.unwrap().len(), 1);

    // the device pushes again; the next poll stores the new sample
    let next = FeedSample {
        recorded_at: now + Duration::seconds(60),
        ..sample
    };
    let later = now + Duration::seconds(70);
    let report = ingest_sample(&store, "warehouse-1", next, later, WINDOW).await.unwrap();
    assert!(!report.duplicate);

    let readings = store.list("warehouse-1").await.unwrap();
    assert_eq!(readings.len(), 2);
    // charting order: oldest first
    assert!(readings[0].recorded_at < readings[1].recorded_at);
}

#[tokio::test]
async fn an_unplugged_sensor_is_classified_offline() {
    let store = MemoryStore::new();
    let now = Utc::now();

    // the feed still serves the last known value from an hour ago
    let sample = FeedSample {
        recorded_at: now - Duration::hours(1),
        temperature: 25.0,
        humidity: 50.0,
        ldr_value: 10.0,
    };

    let report = ingest_sample(&store, "warehouse-1", sample, now, WINDOW).await.unwrap();
    assert!(!report.live);
    assert!(store.list("warehouse-1").await.unwrap().is_empty());
}
