//! Host temperature probe.
//!
//! On Linux this reads the kernel thermal zones under
//! `/sys/class/thermal`. Other platforms expose no measurements, which
//! the poller reports as `SensorReading::Unavailable` rather than a
//! fault.

use async_trait::async_trait;

use sysmend_core::{Error, Measurements, Result, SensorProbe};
#[cfg(target_os = "linux")]
use sysmend_types::Measurement;

/// Probe backed by the platform's thermal sensors.
#[derive(Debug, Default)]
pub struct ThermalProbe;

impl ThermalProbe {
    #[cfg(target_os = "linux")]
    fn read_zones() -> Result<Measurements> {
        let mut measurements = Measurements::new();
        let entries = std::fs::read_dir("/sys/class/thermal")
            .map_err(|e| Error::probe_failed(format!("thermal sysfs unavailable: {e}")))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("thermal_zone") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(entry.path().join("temp")) else {
                continue;
            };
            let Ok(millidegrees) = raw.trim().parse::<i64>() else {
                continue;
            };
            let label = std::fs::read_to_string(entry.path().join("type"))
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|_| name.to_string());
            measurements.insert(
                label,
                Measurement::new(millidegrees as f64 / 1000.0, "°C"),
            );
        }
        Ok(measurements)
    }

    #[cfg(not(target_os = "linux"))]
    fn read_zones() -> Result<Measurements> {
        Ok(Measurements::new())
    }
}

#[async_trait]
impl SensorProbe for ThermalProbe {
    fn name(&self) -> &str {
        "thermal"
    }

    async fn sample(&self) -> Result<Measurements> {
        tokio::task::spawn_blocking(Self::read_zones)
            .await
            .map_err(|e| Error::probe_failed(format!("probe task failed: {e}")))?
    }
}
