//! Blocking HTTP client for the ThingSpeak channel-read API.
//!
//! - Pulls the most recent entry from a channel's `feeds.json` endpoint.
//! - ThingSpeak serves field values as strings; this crate parses them into
//!   numbers and surfaces the entry's own `created_at` timestamp, which is the
//!   moment the physical device pushed the sample (not when we fetched it).
//! - An empty feed list is a normal outcome (`Ok(None)`), not an error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status} from feed")]
    Http { status: u16 },
    #[error("malformed feed payload: {0}")]
    Malformed(String),
}

/// One sample as pushed by the device, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSample {
    pub recorded_at: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub ldr_value: f64,
}

// Field mapping for the warehouse monitoring channel:
// field1 = temperature, field2 = humidity, field3 = LDR raw value.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    created_at: DateTime<Utc>,
    field1: Option<String>,
    field2: Option<String>,
    field3: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    feeds: Vec<FeedEntry>,
}

fn parse_field(name: &str, raw: &Option<String>) -> Result<f64, FeedError> {
    raw.as_deref()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| FeedError::Malformed(format!("{} is not numeric", name)))
}

impl FeedEntry {
    fn into_sample(self) -> Result<FeedSample, FeedError> {
        Ok(FeedSample {
            recorded_at: self.created_at,
            temperature: parse_field("field1", &self.field1)?,
            humidity: parse_field("field2", &self.field2)?,
            ldr_value: parse_field("field3", &self.field3)?,
        })
    }
}

pub struct ThingSpeakClient {
    agent: ureq::Agent,
    base_url: String,
    channel_id: String,
    read_api_key: String,
}

impl ThingSpeakClient {
    pub fn new(channel_id: impl Into<String>, read_api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        ThingSpeakClient {
            agent,
            base_url: DEFAULT_BASE_URL.to_string(),
            channel_id: channel_id.into(),
            read_api_key: read_api_key.into(),
        }
    }

    /// Point the client at a different host (local mock in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the single most recent entry from the channel.
    ///
    /// Retries once on a transport failure; HTTP errors and malformed payloads
    /// are returned as-is. `Ok(None)` means the channel has no entries.
    pub fn latest_feed(&self) -> Result<Option<FeedSample>, FeedError> {
        let url = format!(
            "{}/channels/{}/feeds.json?api_key={}&results=1",
            self.base_url, self.channel_id, self.read_api_key
        );

        let response = match self.agent.get(&url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Transport(_)) => {
                // one bounded retry for the genuinely flaky dependency
                self.agent.get(&url).call().map_err(classify_ureq)?
            }
            Err(e) => return Err(classify_ureq(e)),
        };

        let payload: FeedResponse = response
            .into_json()
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        match payload.feeds.into_iter().next() {
            Some(entry) => entry.into_sample().map(Some),
            None => Ok(None),
        }
    }
}

fn classify_ureq(err: ureq::Error) -> FeedError {
    match err {
        ureq::Error::Status(status, _) => FeedError::Http { status },
        ureq::Error::Transport(t) => FeedError::Transport(t.to_string()),
    }
}
