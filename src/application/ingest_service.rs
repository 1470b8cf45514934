// Ingest service - Use case for accepting inbound sensor readings
use crate::application::aggregator::Aggregator;
use crate::domain::error::ReportError;
use crate::domain::reading::{parse_timestamp, Reading};
use crate::domain::site::SiteRegistry;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Wire shape published by the field devices:
/// `{"d": {"temperature": [..]}, "ts": "2025-06-01 12:00:00"}`
///
/// `ts` is advisory; older firmware sends epoch seconds instead of a string.
#[derive(Debug, Deserialize)]
pub struct ReadingPayload {
    #[serde(default)]
    pub d: PayloadData,
    #[serde(default)]
    pub ts: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayloadData {
    #[serde(default)]
    pub temperature: Value,
}

#[derive(Clone)]
pub struct IngestService {
    aggregator: Arc<Aggregator>,
    sites: Arc<SiteRegistry>,
}

impl IngestService {
    pub fn new(aggregator: Arc<Aggregator>, sites: Arc<SiteRegistry>) -> Self {
        Self { aggregator, sites }
    }

    /// Parse a raw transport payload and record it. Malformed input is
    /// logged and dropped; the error is returned only so callers can report
    /// it back to the sender.
    pub fn ingest_raw(&self, site_id: &str, unit_id: &str, body: &[u8]) -> Result<(), ReportError> {
        let payload: ReadingPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                let err = ReportError::transient(format!("payload is not valid JSON: {}", e));
                tracing::warn!(site = %site_id, unit = %unit_id, "Dropping reading: {}", err);
                return Err(err);
            }
        };

        self.ingest(site_id, unit_id, payload)
    }

    pub fn ingest(&self, site_id: &str, unit_id: &str, payload: ReadingPayload) -> Result<(), ReportError> {
        let result = self.to_reading(site_id, unit_id, payload);

        match result {
            Ok(reading) => {
                tracing::info!(
                    site = %site_id,
                    unit = %unit_id,
                    values = reading.values().len(),
                    "Reading recorded"
                );
                self.aggregator.record(reading);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(site = %site_id, unit = %unit_id, "Dropping reading: {}", e);
                Err(e)
            }
        }
    }

    fn to_reading(&self, site_id: &str, unit_id: &str, payload: ReadingPayload) -> Result<Reading, ReportError> {
        let site = self
            .sites
            .get(site_id)
            .ok_or_else(|| ReportError::transient(format!("site {} is not configured", site_id)))?;
        if site.unit(unit_id).is_none() {
            return Err(ReportError::transient(format!(
                "unit {} is not configured for site {}",
                unit_id, site_id
            )));
        }

        let values = parse_values(&payload.d.temperature)?;
        let observed_at = payload.ts.as_ref().and_then(parse_observed_at);

        Reading::new(site_id, unit_id, values, observed_at)
    }
}

/// Accept integers, floats (truncated) and numeric strings. Anything else
/// rejects the whole reading.
pub fn parse_values(raw: &Value) -> Result<Vec<i32>, ReportError> {
    let items = raw
        .as_array()
        .ok_or_else(|| ReportError::transient("temperature is not a list"))?;

    if items.is_empty() {
        return Err(ReportError::transient("temperature list is empty"));
    }

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            parse_value(item).ok_or_else(|| {
                ReportError::transient(format!("entry {} is not numeric: {}", idx, item))
            })
        })
        .collect()
}

/// Strings go through `parse_timestamp`, integers are epoch seconds. Anything
/// else is ignored rather than failing the reading.
fn parse_observed_at(ts: &Value) -> Option<DateTime<Utc>> {
    match ts {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn parse_value(item: &Value) -> Option<i32> {
    match item {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).ok(),
            None => n.as_f64().and_then(truncate_f64),
        },
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_f64))
        }
        _ => None,
    }
}

fn truncate_f64(value: f64) -> Option<i32> {
    if value.is_finite() && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
        Some(value.trunc() as i32)
    } else {
        None
    }
}
