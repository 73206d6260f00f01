//! ==============================================================================
//! domain.rs - readings, stored records and chart series
//! ==============================================================================
//!
//! purpose:
//!     the data contracts shared by every role:
//!     - SensorReading: what the simulator publishes (json)
//!     - StoredRecord: what the ingest path lands in the document store
//!     - Series: what the backend hands to chart consumers
//!
//! relationships:
//!     - used by: simulator.rs (builds readings)
//!     - used by: ingest.rs (wraps payloads into records)
//!     - used by: api.rs (decodes records, builds series)
//!     - used by: dashboard.rs (consumes readings and series)
//!
//! ==============================================================================

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// series names, in the order the backend returns them
pub const TEMPERATURE_SERIES: &str = "Temperature (°C)";
pub const PRESSURE_SERIES: &str = "Pressure (m2)";
pub const HUMIDITY_SERIES: &str = "Humidity (%rh)";

/// one simulated sensor sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// sensor identifier (e.g., "sensor1")
    pub id: String,
    /// temperature in celsius
    pub temperature: f64,
    /// relative humidity in percent
    pub humidity: f64,
    /// pressure, hPa-like
    pub pressure: f64,
    /// generation instant, ISO-8601 with millisecond precision
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// utf-8 json payload as published on the wire
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// `2024-11-15T10:00:00.000Z`, the shape javascript's toISOString emits
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// a document as it sits in the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// store-assigned document id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// base64 of the utf-8 json message payload
    #[serde(rename = "Body")]
    pub body: String,
    /// ingestion time, epoch seconds
    #[serde(rename = "_ts")]
    pub ts: i64,
}

impl StoredRecord {
    /// wrap a raw message payload the way the routing rule does
    pub fn from_payload(payload: &[u8], ts: i64) -> Self {
        Self {
            id: None,
            body: STANDARD.encode(payload),
            ts,
        }
    }

    /// base64 -> utf-8 -> json
    pub fn decode_body(&self) -> Result<Value, DecodeError> {
        let bytes = STANDARD.decode(self.body.trim())?;
        let text = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("body is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("body is not json: {0}")]
    Json(#[from] serde_json::Error),
}

/// one `[timestampMs, value]` chart point; the value keeps the number as it was stored
pub type Point = (i64, Number);

/// named ordered points for one metric
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<Point>,
}

impl Series {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Vec::new(),
        }
    }
}

/// the three empty series in response order
pub fn empty_series() -> Vec<Series> {
    vec![
        Series::new(TEMPERATURE_SERIES),
        Series::new(PRESSURE_SERIES),
        Series::new(HUMIDITY_SERIES),
    ]
}

/// millisecond timestamp of a decoded reading.
///
/// strings go through [`parse_date_ms`], numbers are taken as milliseconds.
/// anything unparseable, and the epoch itself, yield None.
pub fn reading_timestamp_ms(reading: &Value) -> Option<i64> {
    let ms = match reading.get("timestamp")? {
        Value::String(raw) => parse_date_ms(raw)?,
        Value::Number(n) => {
            let v = n.as_f64()?;
            if !v.is_finite() {
                return None;
            }
            v as i64
        }
        _ => return None,
    };
    (ms != 0).then_some(ms)
}

/// ISO-8601 date strings:
/// - with an offset or `Z`: that instant
/// - date and time without offset: local time
/// - date only: midnight UTC
pub fn parse_date_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis());
        }
    }
    let midnight = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

/// numeric metric value, dropped when missing or zero
pub fn metric_value(reading: &Value, field: &str) -> Option<Number> {
    let Value::Number(n) = reading.get(field)? else {
        return None;
    };
    let v = n.as_f64()?;
    (v != 0.0 && !v.is_nan()).then(|| n.clone())
}

/// fold decoded readings into the three series, preserving input order
pub fn build_series<'a, I>(readings: I) -> Vec<Series>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut series = empty_series();
    for reading in readings {
        let Some(ts) = reading_timestamp_ms(reading) else {
            continue;
        };
        for (slot, field) in [(0, "temperature"), (1, "pressure"), (2, "humidity")] {
            if let Some(v) = metric_value(reading, field) {
                series[slot].data.push((ts, v));
            }
        }
    }
    series
}
