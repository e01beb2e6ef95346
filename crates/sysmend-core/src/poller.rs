//! Backoff-gated telemetry polling.
//!
//! A [`SensorPoller`] wraps a fallible, platform-dependent probe with a
//! [`BackoffPolicy`](crate::BackoffPolicy) and always yields a renderable
//! [`SensorReading`]: a measurement, an explicit `Unavailable`, or a
//! `RetryingIn` countdown while backoff suppresses the probe. Probe errors
//! are absorbed into backoff state, never returned to the caller, so the
//! consumer can drive `poll` on a fixed cadence without knowing anything
//! about retry internals.
//!
//! [`SensorStream`] runs a poller on that cadence in a background task,
//! keeping the probe's latency off the consumer's thread.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sysmend_types::SensorReading;

use crate::backoff::{BackoffPolicy, BackoffState};
use crate::error::Result;

/// Named measurements returned by a single probe attempt.
pub type Measurements = BTreeMap<String, sysmend_types::Measurement>;

/// A platform-dependent telemetry probe.
///
/// A probe returns a set of named measurements (e.g. "CPU" -> 42.0°C) or
/// fails. Returning an empty set is legitimate: it means the platform
/// exposes no matching sensors, which is not a transient fault and does
/// not escalate backoff.
#[async_trait]
pub trait SensorProbe: Send + Sync {
    /// Name of the probe, used for logging.
    fn name(&self) -> &str;

    /// Attempt one reading. May block briefly on OS calls.
    async fn sample(&self) -> Result<Measurements>;
}

/// Options for a sensor poller.
#[derive(Debug, Clone, Default)]
pub struct PollerOptions {
    /// Backoff policy applied to consecutive probe failures.
    pub backoff: BackoffPolicy,
    /// Measurement key to prefer when the probe returns several.
    /// Falls back to the first key in order when absent.
    pub preferred_key: Option<String>,
}

impl PollerOptions {
    /// Options with a preferred measurement key.
    pub fn with_preferred_key(key: impl Into<String>) -> Self {
        Self {
            preferred_key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }
}

/// Wraps a probe with backoff, producing renderable readings.
///
/// Owns its [`BackoffState`] exclusively; pollers are never shared, even
/// when multiple sensors exist.
pub struct SensorPoller<P> {
    probe: P,
    options: PollerOptions,
    state: BackoffState,
    last_known: Option<sysmend_types::Measurement>,
}

impl<P: SensorProbe> SensorPoller<P> {
    /// Create a poller with default options.
    pub fn new(probe: P) -> Self {
        Self::with_options(probe, PollerOptions::default())
    }

    /// Create a poller with custom options.
    pub fn with_options(probe: P, options: PollerOptions) -> Self {
        let state = BackoffState::new(&options.backoff);
        Self {
            probe,
            options,
            state,
            last_known: None,
        }
    }

    /// Current backoff state, for inspection.
    pub fn backoff_state(&self) -> &BackoffState {
        &self.state
    }

    /// Last successful measurement, surviving later failures.
    pub fn last_known(&self) -> Option<&sysmend_types::Measurement> {
        self.last_known.as_ref()
    }

    /// Poll once at the given instant.
    ///
    /// When backoff suppresses the attempt, returns `RetryingIn` with the
    /// time left before the next attempt, without touching the probe.
    /// The consumer gets a monotonic countdown instead of repeated failing
    /// syscalls on every tick.
    pub async fn poll(&mut self, now: Instant) -> SensorReading {
        let policy = &self.options.backoff;
        if !policy.should_attempt(&self.state, now) {
            return SensorReading::RetryingIn(policy.remaining(&self.state, now));
        }

        match self.probe.sample().await {
            Ok(measurements) if measurements.is_empty() => {
                // No matching hardware; a legitimate outcome, not a fault.
                policy.on_success(&mut self.state, now);
                debug!(probe = self.probe.name(), "probe returned no sensors");
                SensorReading::Unavailable
            }
            Ok(mut measurements) => {
                policy.on_success(&mut self.state, now);
                let measurement = self
                    .options
                    .preferred_key
                    .as_deref()
                    .and_then(|key| measurements.remove(key))
                    .or_else(|| {
                        let first = measurements.keys().next().cloned()?;
                        measurements.remove(&first)
                    });
                match measurement {
                    Some(m) => {
                        self.last_known = Some(m.clone());
                        SensorReading::Measurement(m)
                    }
                    None => SensorReading::Unavailable,
                }
            }
            Err(e) => {
                policy.on_failure(&mut self.state, now);
                warn!(
                    probe = self.probe.name(),
                    failures = self.state.consecutive_failures,
                    retry_delay = ?self.state.current_delay,
                    "probe failed: {}",
                    e
                );
                SensorReading::Unavailable
            }
        }
    }
}

/// Options for a background sensor stream.
#[derive(Debug, Clone)]
pub struct SensorStreamOptions {
    /// Cadence on which the poller is driven. Default: 2 seconds.
    pub poll_interval: Duration,
    /// Buffer size for the reading channel. Default: 16 readings.
    pub buffer_size: usize,
}

impl Default for SensorStreamOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            buffer_size: 16,
        }
    }
}

impl SensorStreamOptions {
    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(crate::error::Error::invalid_config(
                "poll_interval must be > 0",
            ));
        }
        if self.buffer_size == 0 {
            return Err(crate::error::Error::invalid_config(
                "buffer_size must be > 0",
            ));
        }
        Ok(())
    }
}

/// A stream of sensor readings driven on a fixed cadence.
///
/// Spawns a background task that polls at the configured interval and
/// sends readings through a channel. Supports graceful shutdown via
/// [`close`](Self::close); dropping the stream also stops the task.
pub struct SensorStream {
    receiver: mpsc::Receiver<SensorReading>,
    handle: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl SensorStream {
    /// Spawn a polling loop around the given poller.
    pub fn new<P>(mut poller: SensorPoller<P>, options: SensorStreamOptions) -> Self
    where
        P: SensorProbe + 'static,
    {
        let (tx, rx) = mpsc::channel(options.buffer_size);
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut cadence = interval(options.poll_interval);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("sensor stream cancelled, stopping");
                        break;
                    }
                    _ = cadence.tick() => {
                        let reading = poller.poll(Instant::now()).await;
                        if tx.send(reading).await.is_err() {
                            debug!("sensor stream receiver dropped, stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            receiver: rx,
            handle,
            cancel_token,
        }
    }

    /// Receive the next reading.
    pub async fn recv(&mut self) -> Option<SensorReading> {
        self.receiver.recv().await
    }

    /// Close the stream and stop the background task gracefully.
    pub fn close(self) {
        self.cancel_token.cancel();
    }

    /// Whether the background task is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SensorStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for SensorStream {
    type Item = SensorReading;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
