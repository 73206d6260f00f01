//! ==============================================================================
//! dashboard.rs - polling dashboard client
//! ==============================================================================
//!
//! purpose:
//!     the consumer side of the backend contract:
//!     - polls /latest-data once immediately, then every interval
//!     - keeps a rolling window (20 points) per metric for the live chart
//!     - on demand, fetches a local date-time range from /data-between
//!       and replaces the historical series wholesale
//!
//! ```text
//!     live polling and history writes touch disjoint state. a failed
//!     fetch leaves whatever was there before.
//! ```
//!
//! relationships:
//!     - uses: domain.rs (Series, series names)
//!     - uses: reqwest (http client)
//!     - used by: main.rs (watch role)
//!
//! ==============================================================================

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Number;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::{empty_series, Series};

pub const DEFAULT_WINDOW: usize = 20;
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// earliest selectable instant, local time
pub fn min_selectable() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 15)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("unexpected reading shape: {0}")]
    Reading(String),
    #[error("invalid date-time {0:?}, expected YYYY-MM-DDTHH:MM")]
    DateTime(String),
    #[error("{0} is before the earliest selectable time")]
    TooEarly(String),
    #[error("start must be before end")]
    EmptyRange,
}

/// what a card shows; the chart only needs these four
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LiveReading {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub timestamp: DateTime<Utc>,
}

/// per-metric rolling windows, oldest dropped first
#[derive(Clone, Debug)]
pub struct LiveWindow {
    capacity: usize,
    series: Vec<Series>,
    latest: Option<LiveReading>,
}

impl LiveWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            series: empty_series(),
            latest: None,
        }
    }

    pub fn push(&mut self, reading: LiveReading) {
        let ts = reading.timestamp.timestamp_millis();
        // same slot order as empty_series(): temperature, pressure, humidity
        let values = [reading.temperature, reading.pressure, reading.humidity];
        for (series, value) in self.series.iter_mut().zip(values) {
            // json readings are always finite
            let Some(value) = Number::from_f64(value) else {
                continue;
            };
            series.data.push((ts, value));
            if series.data.len() > self.capacity {
                let excess = series.data.len() - self.capacity;
                series.data.drain(..excess);
            }
        }
        self.latest = Some(reading);
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn latest(&self) -> Option<&LiveReading> {
        self.latest.as_ref()
    }

    /// "last updated" instant for the header
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.latest.as_ref().map(|r| r.timestamp)
    }
}

/// validate a pair of `YYYY-MM-DDTHH:MM` inputs and convert to epoch ms in `tz`
pub fn history_bounds<Tz: TimeZone>(start: &str, end: &str, tz: &Tz) -> Result<(i64, i64), DashboardError> {
    let parse = |raw: &str| {
        NaiveDateTime::parse_from_str(raw.trim(), DATETIME_INPUT_FORMAT)
            .map_err(|_| DashboardError::DateTime(raw.to_string()))
    };
    let (start_at, end_at) = (parse(start)?, parse(end)?);

    for (raw, at) in [(start, start_at), (end, end_at)] {
        if at < min_selectable() {
            return Err(DashboardError::TooEarly(raw.to_string()));
        }
    }
    if start_at >= end_at {
        return Err(DashboardError::EmptyRange);
    }

    let to_ms = |raw: &str, at: NaiveDateTime| {
        tz.from_local_datetime(&at)
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| DashboardError::DateTime(raw.to_string()))
    };
    Ok((to_ms(start, start_at)?, to_ms(end, end_at)?))
}

pub struct Dashboard {
    base_url: String,
    client: reqwest::Client,
    live: LiveWindow,
    history: Vec<Series>,
}

impl Dashboard {
    pub fn new(base_url: &str, window: usize) -> Result<Self, DashboardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            live: LiveWindow::new(window),
            history: Vec::new(),
        })
    }

    pub fn live(&self) -> &LiveWindow {
        &self.live
    }

    pub fn history(&self) -> &[Series] {
        &self.history
    }

    /// one poll of /latest-data into the live window
    pub async fn poll_latest(&mut self) -> Result<LiveReading, DashboardError> {
        let response = self
            .client
            .get(format!("{}/latest-data", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DashboardError::Status(response.status().as_u16()));
        }
        let body: serde_json::Value = response.json().await?;
        let reading: LiveReading =
            serde_json::from_value(body).map_err(|e| DashboardError::Reading(e.to_string()))?;

        self.live.push(reading.clone());
        Ok(reading)
    }

    /// fetch a local date-time range and replace the historical series
    pub async fn fetch_history(&mut self, start: &str, end: &str) -> Result<&[Series], DashboardError> {
        let (start_ms, end_ms) = history_bounds(start, end, &Local)?;
        self.fetch_history_ms(start_ms, end_ms).await
    }

    pub async fn fetch_history_ms(&mut self, start_ms: i64, end_ms: i64) -> Result<&[Series], DashboardError> {
        let response = self
            .client
            .get(format!("{}/data-between", self.base_url))
            .query(&[("startEpoch", start_ms), ("endEpoch", end_ms)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DashboardError::Status(response.status().as_u16()));
        }
        self.history = response.json().await?;
        Ok(&self.history)
    }
}

fn log_cards(live: &LiveWindow) {
    let Some(reading) = live.latest() else {
        return;
    };
    tracing::info!(
        "Live Data | Humidity {}%rh | Pressure {}m2 | Temp {}°C",
        reading.humidity,
        reading.pressure,
        reading.temperature
    );
    if let Some(at) = live.last_updated() {
        tracing::info!(
            "Last Updated At {}",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// poll now, then every `period`, until `shutdown` flips to true
pub async fn run(dashboard: &mut Dashboard, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // first tick completes immediately: the on-mount fetch
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match dashboard.poll_latest().await {
            Ok(_) => {
                log_cards(dashboard.live());
                for series in dashboard.live().series() {
                    tracing::debug!(series = %series.name, points = series.data.len(), "live window");
                }
            }
            Err(e) => tracing::error!("Failed to fetch data. Please try again later. ({})", e),
        }
    }
}
