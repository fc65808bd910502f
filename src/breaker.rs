//! Circuit breaker for fault isolation
//!
//! Wraps a failure-prone operation: closed until K consecutive failures,
//! then open (calls are skipped) until the recovery timeout elapses,
//! then half-open where a single success closes the circuit and any
//! failure reopens it.

use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    /// Gauge value exported for this state
    pub fn gauge_value(&self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

/// Three-state circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            total_failures: 0,
            total_successes: 0,
        }
    }

    /// Whether the wrapped operation may run right now.
    ///
    /// Transitions open → half-open when the recovery timeout has
    /// elapsed; the half-open probe is allowed through.
    pub fn allow(&mut self) -> bool {
        self.tick(Instant::now())
    }

    fn tick(&mut self, now: Instant) -> bool {
        if self.state == BreakerState::Open {
            let elapsed = self
                .last_failure_at
                .map(|at| now.duration_since(at))
                .unwrap_or_default();
            if elapsed >= self.recovery_timeout {
                self.state = BreakerState::HalfOpen;
                tracing::info!(
                    threshold = self.failure_threshold,
                    "Circuit breaker transitioning to half-open"
                );
            }
        }
        self.state != BreakerState::Open
    }

    /// Record a successful call
    pub fn record_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_failures = 0;
        if self.state == BreakerState::HalfOpen {
            self.state = BreakerState::Closed;
            tracing::info!("Circuit breaker closed after successful recovery");
        }
    }

    /// Record a failed call
    pub fn record_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Instant::now());

        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                tracing::warn!("Circuit breaker reopened after recovery failure");
            }
            BreakerState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = BreakerState::Open;
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        threshold = self.failure_threshold,
                        "Circuit breaker opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&mut self) -> bool {
        !self.allow()
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    /// Force the breaker back to closed
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.last_failure_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(timeout_ms))
    }

    #[test]
    fn test_starts_closed() {
        let mut b = breaker(3, 100);
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow());
    }

    #[test]
    fn test_opens_after_threshold_consecutive_failures() {
        let mut b = breaker(3, 60_000);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let mut b = breaker(3, 60_000);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let mut b = breaker(1, 0);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // Zero timeout: next allow() moves to half-open and admits the probe
        assert!(b.allow());
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes() {
        let mut b = breaker(1, 0);
        b.record_failure();
        assert!(b.allow());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut b = breaker(1, 60_000);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // Simulate timeout expiry
        b.last_failure_at = Some(Instant::now() - Duration::from_secs(120));
        assert!(b.allow());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_counters() {
        let mut b = breaker(5, 100);
        b.record_success();
        b.record_success();
        b.record_failure();
        assert_eq!(b.total_successes(), 2);
        assert_eq!(b.total_failures(), 1);
    }

    #[test]
    fn test_gauge_values() {
        assert_eq!(BreakerState::Closed.gauge_value(), 0);
        assert_eq!(BreakerState::Open.gauge_value(), 1);
        assert_eq!(BreakerState::HalfOpen.gauge_value(), 2);
    }
}
