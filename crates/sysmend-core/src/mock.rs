//! Mock probes and operations for testing.
//!
//! These run without any OS-dependent commands or sensor hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail the first N probe calls, or every call
//!   from the Nth onwards
//! - **Latency simulation**: artificial delays to simulate slow OS calls
//! - **Scripted operations**: fixed step counts with failure, panic, and
//!   threat injection at chosen steps

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sysmend_types::{Measurement, OperationParams, TaskSummary, ThreatDescriptor};

use crate::catalog::Operation;
use crate::error::{Error, Result};
use crate::poller::{Measurements, SensorProbe};
use crate::runner::OperationContext;

/// A scripted telemetry probe.
#[derive(Debug)]
pub struct MockProbe {
    name: String,
    measurements: Measurements,
    calls: AtomicU32,
    /// Fail calls with index < `fail_first`.
    fail_first: u32,
    /// Fail calls with index >= this, when set.
    fail_from: Option<u32>,
    fail_message: String,
    latency: Option<Duration>,
}

impl MockProbe {
    /// Create a probe returning no measurements (no hardware present).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measurements: Measurements::new(),
            calls: AtomicU32::new(0),
            fail_first: 0,
            fail_from: None,
            fail_message: "mock probe failure".to_string(),
            latency: None,
        }
    }

    /// Add a named measurement to successful samples.
    #[must_use]
    pub fn with_measurement(mut self, key: impl Into<String>, measurement: Measurement) -> Self {
        self.measurements.insert(key.into(), measurement);
        self
    }

    /// Fail the first `count` calls, then succeed.
    #[must_use]
    pub fn fail_times(mut self, count: u32, message: impl Into<String>) -> Self {
        self.fail_first = count;
        self.fail_message = message.into();
        self
    }

    /// Succeed for the first `count` calls, then fail forever.
    #[must_use]
    pub fn fail_after(mut self, count: u32, message: impl Into<String>) -> Self {
        self.fail_from = Some(count);
        self.fail_message = message.into();
        self
    }

    /// Fail every call.
    #[must_use]
    pub fn fail_forever(mut self, message: impl Into<String>) -> Self {
        self.fail_from = Some(0);
        self.fail_message = message.into();
        self
    }

    /// Simulate probe latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of times `sample` was invoked.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorProbe for MockProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self) -> Result<Measurements> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failing =
            call < self.fail_first || self.fail_from.is_some_and(|from| call >= from);
        if failing {
            return Err(Error::probe_failed(&self.fail_message));
        }
        Ok(self.measurements.clone())
    }
}

/// A scripted operation body.
pub struct MockOperation {
    surface: String,
    steps: u32,
    step_delay: Duration,
    fail_at: Option<(u32, String)>,
    panic_at: Option<u32>,
    threats: Vec<ThreatDescriptor>,
    executions: AtomicU32,
}

impl MockOperation {
    /// Create a one-step operation on the given tool surface.
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            steps: 1,
            step_delay: Duration::ZERO,
            fail_at: None,
            panic_at: None,
            threats: Vec::new(),
            executions: AtomicU32::new(0),
        }
    }

    /// Set the number of discrete steps; cancellation is checked before
    /// each one.
    #[must_use]
    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps.max(1);
        self
    }

    /// Sleep this long inside each step.
    #[must_use]
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Return an error when reaching the given step index.
    #[must_use]
    pub fn fail_at(mut self, step: u32, message: impl Into<String>) -> Self {
        self.fail_at = Some((step, message.into()));
        self
    }

    /// Panic when reaching the given step index.
    #[must_use]
    pub fn panic_at(mut self, step: u32) -> Self {
        self.panic_at = Some(step);
        self
    }

    /// Report this threat during the first step.
    #[must_use]
    pub fn with_threat(mut self, descriptor: ThreatDescriptor) -> Self {
        self.threats.push(descriptor);
        self
    }

    /// Number of times `execute` was invoked.
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for MockOperation {
    fn surface(&self) -> &str {
        &self.surface
    }

    async fn execute(
        &self,
        _params: &OperationParams,
        ctx: &OperationContext,
    ) -> Result<TaskSummary> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        for step in 0..self.steps {
            ctx.ensure_active()?;

            if self.panic_at == Some(step) {
                panic!("mock operation panic at step {}", step);
            }
            if let Some((fail_step, message)) = &self.fail_at
                && *fail_step == step
            {
                return Err(Error::operation_failed(message.clone()));
            }

            if step == 0 {
                for threat in &self.threats {
                    ctx.report_threat(threat.clone());
                }
            }

            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            ctx.report_progress(((step + 1) * 100 / self.steps) as u8);
        }

        Ok(TaskSummary::new("Mock operation complete")
            .with_count("steps", u64::from(self.steps))
            .with_count("threats", self.threats.len() as u64))
    }
}
