use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SKIP: u32 = 0;
pub const DEFAULT_LIMIT: u32 = 10;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One persisted detection outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub person_count: i32,
    pub output_image_path: String,
}

/// Detection event before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewDetectionEvent {
    /// Defaults to insertion time when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub person_count: u32,
    pub output_image_path: String,
}

impl NewDetectionEvent {
    pub fn new(person_count: u32, output_image_path: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            person_count,
            output_image_path: output_image_path.into(),
        }
    }

    /// Database representation of the person count
    pub fn person_count_i32(&self) -> Result<i32> {
        i32::try_from(self.person_count).map_err(|_| {
            Error::Internal(format!("person count {} out of range", self.person_count))
        })
    }
}

/// Raw history query parameters as received over HTTP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "startTime", alias = "start_time")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime", alias = "end_time")]
    pub end_time: Option<String>,
    pub search: Option<String>,
}

impl HistoryParams {
    /// Validate the parameters into a filter. Fails before any query runs.
    pub fn into_filter(self) -> Result<HistoryFilter> {
        let start_time = non_empty(self.start_time)
            .map(|value| parse_timestamp("startTime", &value))
            .transpose()?;
        let end_time = non_empty(self.end_time)
            .map(|value| parse_timestamp("endTime", &value))
            .transpose()?;

        Ok(HistoryFilter {
            start_time,
            end_time,
            search: non_empty(self.search),
            skip: self.skip.unwrap_or(DEFAULT_SKIP),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validated history filter. Time bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFilter {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Substring matched against the output image path
    pub search: Option<String>,
    pub skip: u32,
    pub limit: u32,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            search: None,
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl HistoryFilter {
    /// Whether an event satisfies the filter, ignoring pagination
    pub fn matches(&self, event: &DetectionEvent) -> bool {
        self.start_time.map_or(true, |start| event.timestamp >= start)
            && self.end_time.map_or(true, |end| event.timestamp <= end)
            && self
                .search
                .as_deref()
                .map_or(true, |needle| event.output_image_path.contains(needle))
    }
}

/// One page of history plus the unpaginated match count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<DetectionEvent>,
    pub total: i64,
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.and_utc());
        }
    }
    if let Some(ts) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(ts.and_utc());
    }

    Err(Error::InvalidFilter(format!(
        "Invalid {} format. Use ISO 8601 format (YYYY-MM-DDTHH:MM:SS).",
        field
    )))
}
