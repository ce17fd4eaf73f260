use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::SyncConfig;

/// Whether a sync attempt may run now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryGate {
    Ready,
    /// Waiting out the backoff delay after a failure.
    Backoff { retry_in: Duration },
    /// Too many consecutive failures; attempts are suspended.
    CircuitOpen { retry_in: Duration },
}

/// Exponential backoff with jitter plus a consecutive-failure circuit breaker.
///
/// After `breaker_threshold` failures in a row the circuit opens for
/// `breaker_cooldown`; once that elapses a single trial attempt is allowed,
/// and another failure re-opens it immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    threshold: u32,
    cooldown: Duration,
    jitter: bool,
    failures: u32,
    next_attempt: Option<Instant>,
    open_until: Option<Instant>,
}

impl RetryPolicy {
    pub fn new(config: &SyncConfig) -> Self {
        RetryPolicy {
            base: config.backoff_base(),
            max: config.backoff_max(),
            threshold: config.breaker_threshold.max(1),
            cooldown: config.breaker_cooldown(),
            jitter: true,
            failures: 0,
            next_attempt: None,
            open_until: None,
        }
    }

    /// Disable jitter so delays are exactly the exponential schedule.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    pub fn check(&self, now: Instant) -> RetryGate {
        if let Some(until) = self.open_until {
            if now < until {
                return RetryGate::CircuitOpen {
                    retry_in: until - now,
                };
            }
            return RetryGate::Ready;
        }
        match self.next_attempt {
            Some(at) if now < at => RetryGate::Backoff { retry_in: at - now },
            _ => RetryGate::Ready,
        }
    }

    /// Un-jittered delay after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Record a failed attempt, returning the delay before the next one.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);

        if self.failures >= self.threshold {
            self.open_until = Some(now + self.cooldown);
            self.next_attempt = None;
            return self.cooldown;
        }

        let delay = self.delay_for(self.failures);
        let delay = if self.jitter && !delay.is_zero() {
            // Equal jitter: half fixed, half random.
            let half = delay / 2;
            let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
            half + Duration::from_millis(spread)
        } else {
            delay
        };
        self.next_attempt = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
        self.open_until = None;
    }
}
