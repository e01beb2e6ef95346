//! Exponential backoff for repeatedly failing telemetry probes.
//!
//! Backoff state is a plain value owned by exactly one poller; the policy
//! is a pure function object over it. A single failure does not suppress
//! the next attempt; only the second and subsequent consecutive failures
//! start stretching the retry delay, doubling it up to a finite ceiling.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use sysmend_core::{BackoffPolicy, BackoffState};
//!
//! let policy = BackoffPolicy::default();
//! let mut state = BackoffState::new(&policy);
//!
//! let now = Instant::now();
//! policy.on_failure(&mut state, now);
//! // First failure never suppresses the retry.
//! assert!(policy.should_attempt(&state, now));
//! ```

use std::cmp;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{Error, Result};

/// Policy computing retry delays after consecutive probe failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the second consecutive failure; also the reset value.
    pub base: Duration,
    /// Upper bound on the retry delay. Finite: at worst the probe is
    /// re-attempted once per ceiling interval, never abandoned.
    pub ceiling: Duration,
    /// Whether to add up to 25% jitter when the delay is raised.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            ceiling: Duration::from_secs(300),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with a custom base and ceiling, no jitter.
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            jitter: false,
        }
    }

    /// Set the base delay.
    #[must_use]
    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the delay ceiling.
    #[must_use]
    pub fn ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Validate the policy and return an error if invalid.
    ///
    /// Checks that:
    /// - `base` is > 0
    /// - `ceiling` >= `base`
    pub fn validate(&self) -> Result<()> {
        if self.base.is_zero() {
            return Err(Error::invalid_config("backoff base must be > 0"));
        }
        if self.ceiling < self.base {
            return Err(Error::invalid_config("backoff ceiling must be >= base"));
        }
        Ok(())
    }

    /// Record a successful probe attempt.
    ///
    /// Resets the failure count and collapses the delay back to base,
    /// regardless of how many failures had accumulated.
    pub fn on_success(&self, state: &mut BackoffState, now: Instant) {
        state.consecutive_failures = 0;
        state.current_delay = self.base;
        state.last_attempt_at = Some(now);
    }

    /// Record a failed probe attempt.
    ///
    /// The delay only starts doubling from the second consecutive failure,
    /// so after the Nth failure (N >= 2) it equals
    /// `min(base * 2^(N-1), ceiling)`.
    pub fn on_failure(&self, state: &mut BackoffState, now: Instant) {
        if state.consecutive_failures >= 1 {
            let doubled = cmp::min(state.current_delay.saturating_mul(2), self.ceiling);
            state.current_delay = if self.jitter {
                let factor = 1.0 + rand::rng().random::<f64>() * 0.25;
                cmp::min(doubled.mul_f64(factor), self.ceiling)
            } else {
                doubled
            };
        }
        state.consecutive_failures += 1;
        state.last_attempt_at = Some(now);
    }

    /// Whether the probe should be attempted now.
    ///
    /// True immediately after the first failure (no suppression yet), and
    /// after the current delay has elapsed following later failures.
    #[must_use]
    pub fn should_attempt(&self, state: &BackoffState, now: Instant) -> bool {
        if state.consecutive_failures <= 1 {
            return true;
        }
        match state.last_attempt_at {
            Some(at) => now.duration_since(at) >= state.current_delay,
            None => true,
        }
    }

    /// Time left until the next attempt is allowed.
    ///
    /// Zero when [`should_attempt`](Self::should_attempt) is true. The
    /// returned value decreases monotonically between attempts, giving the
    /// consumer a countdown to render.
    #[must_use]
    pub fn remaining(&self, state: &BackoffState, now: Instant) -> Duration {
        if self.should_attempt(state, now) {
            return Duration::ZERO;
        }
        match state.last_attempt_at {
            Some(at) => state
                .current_delay
                .saturating_sub(now.duration_since(at)),
            None => Duration::ZERO,
        }
    }
}

/// Per-poller record of consecutive failures and the current retry delay.
///
/// Never shared across pollers; each sensor owns its own state.
#[derive(Debug, Clone)]
pub struct BackoffState {
    /// Failures since the last success. Reset to 0 on any success.
    pub consecutive_failures: u32,
    /// Current retry delay. Non-decreasing while failures accumulate.
    pub current_delay: Duration,
    /// Timestamp of the most recent probe attempt, success or failure.
    pub last_attempt_at: Option<Instant>,
}

impl BackoffState {
    /// Create fresh state for the given policy.
    #[must_use]
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            consecutive_failures: 0,
            current_delay: policy.base,
            last_attempt_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(base_secs: u64, ceiling_secs: u64) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(base_secs),
            Duration::from_secs(ceiling_secs),
        )
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::default().validate().is_ok());
        assert!(policy(0, 60).validate().is_err());
        assert!(policy(10, 5).validate().is_err());
    }

    #[test]
    fn test_first_failure_keeps_base_delay() {
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let now = Instant::now();

        policy.on_failure(&mut state, now);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.current_delay, Duration::from_secs(1));
        assert!(policy.should_attempt(&state, now));
    }

    #[test]
    fn test_delay_doubles_from_second_failure() {
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let now = Instant::now();

        policy.on_failure(&mut state, now);
        policy.on_failure(&mut state, now);
        assert_eq!(state.current_delay, Duration::from_secs(2));

        policy.on_failure(&mut state, now);
        assert_eq!(state.current_delay, Duration::from_secs(4));

        policy.on_failure(&mut state, now);
        assert_eq!(state.current_delay, Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_ceiling() {
        let policy = policy(1, 10);
        let mut state = BackoffState::new(&policy);
        let now = Instant::now();

        for _ in 0..20 {
            policy.on_failure(&mut state, now);
        }
        assert_eq!(state.current_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_success_resets_regardless_of_failure_count() {
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let now = Instant::now();

        for _ in 0..7 {
            policy.on_failure(&mut state, now);
        }
        assert!(state.current_delay > Duration::from_secs(1));

        policy.on_success(&mut state, now);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_should_attempt_suppresses_after_second_failure() {
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let start = Instant::now();

        policy.on_failure(&mut state, start);
        policy.on_failure(&mut state, start);

        // 2s delay now in force: not yet elapsed.
        assert!(!policy.should_attempt(&state, start + Duration::from_secs(1)));
        assert!(policy.should_attempt(&state, start + Duration::from_secs(2)));
    }

    #[test]
    fn test_three_failure_scenario() {
        // base=1s, ceiling=60s: delays observed are
        // [not suppressed, 2s, 4s] before the 4th attempt is allowed.
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let mut now = Instant::now();

        policy.on_failure(&mut state, now);
        assert!(policy.should_attempt(&state, now));

        policy.on_failure(&mut state, now);
        assert_eq!(state.current_delay, Duration::from_secs(2));
        assert!(!policy.should_attempt(&state, now));
        now += Duration::from_secs(2);
        assert!(policy.should_attempt(&state, now));

        policy.on_failure(&mut state, now);
        assert_eq!(state.current_delay, Duration::from_secs(4));
        assert!(!policy.should_attempt(&state, now + Duration::from_secs(3)));
        assert!(policy.should_attempt(&state, now + Duration::from_secs(4)));
    }

    #[test]
    fn test_remaining_counts_down() {
        let policy = policy(1, 60);
        let mut state = BackoffState::new(&policy);
        let start = Instant::now();

        policy.on_failure(&mut state, start);
        policy.on_failure(&mut state, start);

        let early = policy.remaining(&state, start + Duration::from_millis(500));
        let late = policy.remaining(&state, start + Duration::from_millis(1500));
        assert!(early > late);
        assert_eq!(
            policy.remaining(&state, start + Duration::from_secs(2)),
            Duration::ZERO
        );
    }

    proptest! {
        #[test]
        fn prop_nth_failure_delay_formula(
            base_ms in 1u64..5_000,
            ceiling_mult in 1u32..64,
            n in 2u32..16,
        ) {
            let base = Duration::from_millis(base_ms);
            let ceiling = base * ceiling_mult;
            let policy = BackoffPolicy::new(base, ceiling);
            let mut state = BackoffState::new(&policy);
            let now = Instant::now();

            for _ in 0..n {
                policy.on_failure(&mut state, now);
            }

            let expected = cmp::min(base.saturating_mul(2u32.pow(n - 1)), ceiling);
            prop_assert_eq!(state.current_delay, expected);
        }

        #[test]
        fn prop_delay_monotone_while_failing(n in 1u32..20) {
            let policy = BackoffPolicy::default();
            let mut state = BackoffState::new(&policy);
            let now = Instant::now();
            let mut previous = state.current_delay;

            for _ in 0..n {
                policy.on_failure(&mut state, now);
                prop_assert!(state.current_delay >= previous);
                previous = state.current_delay;
            }
        }
    }
}
