//! ==============================================================================
//! simulator.rs - mock sensor module
//! ==============================================================================
//!
//! purpose:
//!     produces synthetic temperature/humidity/pressure readings on a fixed
//!     interval and publishes each one to a message sink.
//!
//! ```text
//!     the walk is bounded on temperature only:
//!
//!         20 °C ──rising──▶ 40 °C
//!           ◀──falling──
//!
//!     humidity and pressure follow the direction but are never clamped.
//! ```
//!
//! relationships:
//!     - uses: domain.rs (SensorReading)
//!     - uses: sink.rs (MessageSink, publishes payloads)
//!     - used by: main.rs (simulate / all-in-one roles)
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::domain::SensorReading;
use crate::sink::MessageSink;

pub const TEMPERATURE_STEP: f64 = 0.5;
pub const HUMIDITY_STEP: f64 = 0.2;
pub const PRESSURE_STEP: f64 = 0.1;

pub const TEMPERATURE_LOW: f64 = 20.0;
pub const TEMPERATURE_HIGH: f64 = 40.0;

/// the running scalars; owned by whichever task drives the ticks
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatorState {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub rising: bool,
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            humidity: 50.0,
            pressure: 1010.0,
            rising: true,
        }
    }
}

impl SimulatorState {
    /// advance one step and build the reading for `now`
    pub fn tick(&mut self, sensor_id: &str, now: DateTime<Utc>) -> SensorReading {
        if self.rising {
            self.temperature += TEMPERATURE_STEP;
            self.humidity -= HUMIDITY_STEP;
            self.pressure += PRESSURE_STEP;
        } else {
            self.temperature -= TEMPERATURE_STEP;
            self.humidity += HUMIDITY_STEP;
            self.pressure -= PRESSURE_STEP;
        }

        // the low bound is checked last and wins if both ever hold
        if self.temperature >= TEMPERATURE_HIGH {
            self.rising = false;
        }
        if self.temperature <= TEMPERATURE_LOW {
            self.rising = true;
        }

        self.temperature = round2(self.temperature);
        self.humidity = round2(self.humidity);
        self.pressure = round2(self.pressure);

        SensorReading {
            id: sensor_id.to_string(),
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            timestamp: now,
        }
    }
}

/// round half away from zero to two decimals
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// knobs for the publish loop
#[derive(Clone, Debug)]
pub struct SimulatorSettings {
    pub sensor_id: String,
    pub channel: String,
    pub interval: Duration,
    pub show_sensor_data: bool,
}

/// tick + publish every interval until `shutdown` flips to true.
///
/// the first reading goes out one full interval after start. publish
/// failures are logged and dropped; the next tick carries on.
pub async fn run(
    settings: SimulatorSettings,
    sink: &dyn MessageSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = SimulatorState::default();
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately; swallow that one
    ticker.tick().await;

    tracing::info!(
        sensor = %settings.sensor_id,
        channel = %settings.channel,
        interval_s = settings.interval.as_secs(),
        "simulator started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let reading = state.tick(&settings.sensor_id, Utc::now());
        publish(&settings, sink, &reading).await;
    }

    tracing::info!("simulator stopped");
}

async fn publish(settings: &SimulatorSettings, sink: &dyn MessageSink, reading: &SensorReading) {
    let payload = match reading.to_payload() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("failed to serialize reading: {}", e);
            return;
        }
    };

    if settings.show_sensor_data {
        tracing::info!(
            "[SIM] Temp: {:.2}°C | Humidity: {:.2}% | Pressure: {:.2}",
            reading.temperature,
            reading.humidity,
            reading.pressure
        );
    }

    match sink.send_output_event(&settings.channel, payload).await {
        Ok(()) => tracing::debug!(channel = %settings.channel, "message sent"),
        Err(e) => tracing::warn!(channel = %settings.channel, "sending message failed: {}", e),
    }
}
