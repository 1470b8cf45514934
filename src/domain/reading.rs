// Reading domain model
use crate::domain::error::ReportError;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Highest raw code a sensor may report. Anything above is outside every
/// known band and is rejected at construction.
pub const MAX_SENSOR_CODE: i32 = 99;

/// One full update for one unit: the flat sensor vector in cable order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    site_id: String,
    unit_id: String,
    values: Vec<i32>,
    observed_at: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn new(
        site_id: impl Into<String>,
        unit_id: impl Into<String>,
        values: Vec<i32>,
        observed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ReportError> {
        let site_id = site_id.into();
        let unit_id = unit_id.into();

        if values.is_empty() {
            return Err(ReportError::transient(format!(
                "{}/{} carried no sensor values",
                site_id, unit_id
            )));
        }

        if let Some(bad) = values
            .iter()
            .find(|v| !(0..=MAX_SENSOR_CODE).contains(*v))
        {
            return Err(ReportError::transient(format!(
                "{}/{} carried out-of-range code {}",
                site_id, unit_id, bad
            )));
        }

        Ok(Self {
            site_id,
            unit_id,
            values,
            observed_at,
        })
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }
}

/// Parse the transport timestamp. Devices send either RFC 3339 or a bare
/// `YYYY-MM-DD HH:MM:SS`, which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
