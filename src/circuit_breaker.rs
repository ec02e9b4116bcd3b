//! # Circuit Breaker Module
//!
//! Implements the circuit breaker pattern for the hosted extraction
//! service. Repeated transient failures open the circuit so pipeline runs
//! fail fast instead of piling up on a degraded backend; the circuit
//! resets automatically after the configured timeout.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ocr_config::RecoveryConfig;

/// Failure-count circuit breaker with timed reset.
///
/// State machine: CLOSED until `circuit_breaker_threshold` consecutive
/// failures, then OPEN for `circuit_breaker_reset_secs`, after which the
/// counters reset and the next request tests the service again.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_count: Mutex<u32>,
    last_failure_time: Mutex<Option<Instant>>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            failure_count: Mutex::new(0),
            last_failure_time: Mutex::new(None),
            config,
        }
    }

    /// Check if the circuit is open (blocking requests).
    ///
    /// Automatically resets to closed once the reset timeout has elapsed
    /// since the last recorded failure.
    pub fn is_open(&self) -> bool {
        let failure_count = *self.failure_count.lock();
        let last_failure = *self.last_failure_time.lock();

        if failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = last_failure {
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs)
                {
                    return true;
                }
                // Reset and allow a test request through
                *self.failure_count.lock() = 0;
                *self.last_failure_time.lock() = None;
            }
        }
        false
    }

    /// Record a failed call, incrementing the failure counter
    pub fn record_failure(&self) {
        *self.failure_count.lock() += 1;
        *self.last_failure_time.lock() = Some(Instant::now());
    }

    /// Record a successful call, resetting the failure counter
    pub fn record_success(&self) {
        *self.failure_count.lock() = 0;
        *self.last_failure_time.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_state_transitions() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(config);

        // Initially closed
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(!breaker.is_open()); // Still closed (1 failure)

        breaker.record_failure();
        assert!(breaker.is_open()); // Now open (2 failures)
    }

    #[test]
    fn test_success_resets_failure_count() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(config);

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_circuit_resets_after_timeout() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 1,
            circuit_breaker_reset_secs: 1,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(config);

        breaker.record_failure();
        assert!(breaker.is_open());

        std::thread::sleep(Duration::from_millis(1100));
        assert!(!breaker.is_open());
    }
}
