//! NEO feed source.
//!
//! Defines the normalized [`ObjectRecord`], the [`FeedSource`] trait every
//! provider implements, and [`NeoWsFeed`], the NASA NeoWs client.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;

use cosmic_common::config::FeedConfig;
use cosmic_common::util::sanitize_for_log;

// ============================================================================
// Types
// ============================================================================

/// A near-earth object as observed in one feed fetch.
///
/// Numeric fields are `None` when the upstream value is missing or
/// unparsable; the scorer decides what that means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Feed-assigned identity
    pub id: String,
    /// Display name, e.g. "(2024 AB1)"
    pub name: String,
    /// Potentially hazardous asteroid flag
    pub hazardous: bool,
    /// Estimated diameter lower bound (m)
    pub diameter_min_m: Option<f64>,
    /// Estimated diameter upper bound (m)
    pub diameter_max_m: Option<f64>,
    /// Relative velocity at closest approach (km/h)
    pub velocity_kph: Option<f64>,
    /// Miss distance at closest approach (km)
    pub miss_distance_km: Option<f64>,
}

impl ObjectRecord {
    /// Mean of the available diameter bounds.
    pub fn mean_diameter_m(&self) -> Option<f64> {
        match (self.diameter_min_m, self.diameter_max_m) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (Some(d), None) | (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }
}

/// Inclusive date range requested from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FeedWindow {
    /// Today (UTC) through today + `days`.
    pub fn starting_today(days: u32) -> Self {
        let start = Utc::now().date_naive();
        Self {
            start,
            end: start + ChronoDuration::days(i64::from(days)),
        }
    }
}

/// Errors raised by a feed source.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Upstream unreachable, non-success status, or unrecognized body
    #[error("Feed unavailable: {0}")]
    Unavailable(String),
}

/// Source of NEO records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Fetch a flat, de-duplicated batch for the window.
    async fn fetch(&self, window: FeedWindow) -> Result<Vec<ObjectRecord>, FeedError>;
}

// ============================================================================
// NeoWs wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeedResponse {
    near_earth_objects: BTreeMap<String, Value>,
}

// Fields degrade to `None` (or `false`) on a wrong upstream type.

#[derive(Debug, Deserialize)]
struct RawNeo {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    is_potentially_hazardous_asteroid: bool,
    #[serde(default, deserialize_with = "lenient")]
    estimated_diameter: Option<RawDiameter>,
    #[serde(default, deserialize_with = "lenient")]
    close_approach_data: Option<Vec<RawApproach>>,
}

#[derive(Debug, Deserialize)]
struct RawDiameter {
    #[serde(default, deserialize_with = "lenient")]
    meters: Option<RawRange>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    #[serde(default, deserialize_with = "lenient_number")]
    estimated_diameter_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    estimated_diameter_max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawApproach {
    #[serde(default, deserialize_with = "lenient")]
    relative_velocity: Option<RawVelocity>,
    #[serde(default, deserialize_with = "lenient")]
    miss_distance: Option<RawMiss>,
}

#[derive(Debug, Deserialize)]
struct RawVelocity {
    #[serde(default, deserialize_with = "lenient_number")]
    kilometers_per_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMiss {
    #[serde(default, deserialize_with = "lenient_number")]
    kilometers: Option<f64>,
}

/// Any value that does not deserialize as `T` becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// NeoWs sends some numbers as strings and others as JSON numbers.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|v| v.is_finite()))
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    Ok(id.filter(|s| !s.is_empty()))
}

impl RawNeo {
    /// `None` when the record has no usable id.
    fn into_record(self) -> Option<ObjectRecord> {
        let id = self.id?;
        let meters = self.estimated_diameter.and_then(|d| d.meters);
        let approach = self.close_approach_data.unwrap_or_default().into_iter().next();

        Some(ObjectRecord {
            name: self.name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.clone()),
            id,
            hazardous: self.is_potentially_hazardous_asteroid,
            diameter_min_m: meters.as_ref().and_then(|m| m.estimated_diameter_min),
            diameter_max_m: meters.as_ref().and_then(|m| m.estimated_diameter_max),
            velocity_kph: approach
                .as_ref()
                .and_then(|a| a.relative_velocity.as_ref())
                .and_then(|v| v.kilometers_per_hour),
            miss_distance_km: approach
                .as_ref()
                .and_then(|a| a.miss_distance.as_ref())
                .and_then(|m| m.kilometers),
        })
    }
}

/// Parse a NeoWs `/feed` body into a flat, de-duplicated record list.
///
/// Dates are walked in ascending order; the first occurrence of an id wins.
/// Only a record without a usable id is dropped; malformed numeric fields
/// are left empty for the scorer.
pub fn parse_feed(body: &str) -> Result<Vec<ObjectRecord>, FeedError> {
    let response: FeedResponse = serde_json::from_str(body)
        .map_err(|e| FeedError::Unavailable(format!("unrecognized feed body: {e}")))?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (date, entries) in response.near_earth_objects {
        let Value::Array(entries) = entries else {
            tracing::warn!(date = %date, "Feed date entry is not a list, skipping");
            continue;
        };

        for (index, entry) in entries.into_iter().enumerate() {
            let record = serde_json::from_value::<RawNeo>(entry)
                .ok()
                .and_then(RawNeo::into_record);
            let Some(record) = record else {
                tracing::warn!(date = %date, index, "Dropping feed record without a usable id");
                continue;
            };
            if seen.insert(record.id.clone()) {
                records.push(record);
            }
        }
    }

    Ok(records)
}

// ============================================================================
// NeoWs client
// ============================================================================

/// NASA NeoWs feed client.
pub struct NeoWsFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NeoWsFeed {
    /// Create a client from configuration.
    pub fn new(config: &FeedConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }

    fn feed_url(&self, window: FeedWindow) -> String {
        format!(
            "{}/feed?start_date={}&end_date={}&api_key={}",
            self.base_url,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
            self.api_key
        )
    }
}

#[async_trait]
impl FeedSource for NeoWsFeed {
    fn name(&self) -> &'static str {
        "neows"
    }

    async fn fetch(&self, window: FeedWindow) -> Result<Vec<ObjectRecord>, FeedError> {
        let url = self.feed_url(window);
        tracing::debug!(url = %sanitize_for_log(&url), "Fetching NEO feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Unavailable(sanitize_for_log(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Unavailable(format!(
                "HTTP {}: {}",
                status,
                cosmic_common::util::truncate_with_ellipsis(&body, 200)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Unavailable(sanitize_for_log(&e.to_string())))?;

        let records = parse_feed(&body)?;
        tracing::info!(
            start = %window.start,
            end = %window.end,
            count = records.len(),
            "NEO feed fetched"
        );
        Ok(records)
    }
}
