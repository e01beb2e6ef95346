//! Sensor reading types and their rendering contract.
//!
//! A telemetry probe result is always one of three renderable forms:
//! a measurement with a unit (`"42.0°C"`), an explicit `"N/A"`, or a
//! retry countdown (`"Retry in 5s"` / `"Retry in 2m"`). Callers must
//! handle all three distinctly; the poller never surfaces raw probe
//! errors to its consumer.

use core::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single unit-annotated sensor value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Measured value.
    pub value: f64,
    /// Unit suffix rendered directly after the value (e.g. "°C", "%").
    pub unit: String,
}

impl Measurement {
    /// Create a new measurement.
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}{}", self.value, self.unit)
    }
}

/// Tri-state result of a telemetry poll.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new forms
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
#[non_exhaustive]
pub enum SensorReading {
    /// The probe produced a value.
    Measurement(Measurement),
    /// The probe failed, or the platform exposes no matching sensor.
    Unavailable,
    /// Polling is suppressed by backoff; the probe will not be attempted
    /// again for this long.
    RetryingIn(Duration),
}

impl SensorReading {
    /// Shorthand constructor for a measurement reading.
    pub fn measurement(value: f64, unit: impl Into<String>) -> Self {
        SensorReading::Measurement(Measurement::new(value, unit))
    }

    /// Returns the measurement, if this reading carries one.
    #[must_use]
    pub fn as_measurement(&self) -> Option<&Measurement> {
        match self {
            SensorReading::Measurement(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for SensorReading {
    /// Renders the three forms distinctly.
    ///
    /// Countdowns use minute granularity above 60 seconds, rounding up
    /// so the displayed wait never undershoots the actual delay.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReading::Measurement(m) => write!(f, "{}", m),
            SensorReading::Unavailable => write!(f, "N/A"),
            SensorReading::RetryingIn(delay) => {
                let mut secs = delay.as_secs();
                if delay.subsec_nanos() > 0 {
                    secs += 1;
                }
                if secs > 60 {
                    write!(f, "Retry in {}m", secs.div_ceil(60))
                } else {
                    write!(f, "Retry in {}s", secs)
                }
            }
        }
    }
}
