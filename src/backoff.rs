//! Jittered, capped, geometric backoff shared by the wait engine (§4.2) and
//! the retry engine (§4.3).
//!
//! `tokio_retry::strategy::ExponentialBackoff` couples its growth rate to
//! its starting value (each step multiplies by the same base), which can't
//! express "start at 500ms, grow by a 1.5x factor" independently. `Backoff`
//! below is a small hand-rolled iterator that keeps the same shape
//! (construct once, iterate `Duration`s, feed to a retry driver) while
//! supporting an arbitrary float growth factor and symmetric jitter.

use rand::Rng;
use std::time::Duration;

/// A safety ceiling on the number of polling/retry steps a single wait can
/// take, independent of how small the configured timeout slices are.
pub const MAX_STEPS: u64 = 1_000_000;

#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Mandatory pre-poll sleep so the controller can observe the client's
    /// preceding write before polling starts.
    pub operator_delay: Duration,
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Symmetric jitter fraction, e.g. `0.1` for ±10%.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            operator_delay: Duration::from_secs(2),
            initial_delay: Duration::from_millis(500),
            factor: 1.5,
            max_delay: Duration::from_secs(5),
            jitter: 0.10,
        }
    }
}

/// An infinite iterator of jittered, capped, geometrically growing delays.
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    factor: f64,
    max_delay: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(cfg: &BackoffConfig) -> Self {
        Self {
            next: cfg.initial_delay,
            factor: cfg.factor,
            max_delay: cfg.max_delay,
            jitter: cfg.jitter,
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let mut rng = rand::thread_rng();
        let spread: f64 = rng.gen_range(-self.jitter..=self.jitter);
        let scaled = base.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let capped = self.next.min(self.max_delay);
        let emitted = self.jittered(capped);
        let grown = self.next.as_secs_f64() * self.factor;
        self.next = Duration::from_secs_f64(grown).min(self.max_delay);
        Some(emitted)
    }
}

/// Computes how many backoff steps are needed to cover `timeout`, by
/// accumulating the (un-jittered) geometric delay until it reaches the
/// timeout, then padding with `ceil(remaining / cap)` more steps once the
/// cap is hit. `timeout == Duration::ZERO` means unbounded: the loop is
/// terminated only by cancellation, so the step budget is the safety
/// ceiling itself.
pub fn step_count(cfg: &BackoffConfig, timeout: Duration) -> u64 {
    if timeout.is_zero() {
        return MAX_STEPS;
    }

    let mut elapsed = Duration::ZERO;
    let mut delay = cfg.initial_delay;
    let mut steps: u64 = 0;

    while elapsed < timeout && steps < MAX_STEPS {
        let capped = delay.min(cfg.max_delay);
        if capped >= cfg.max_delay {
            let remaining = timeout.saturating_sub(elapsed);
            let extra = remaining.as_secs_f64() / cfg.max_delay.as_secs_f64();
            steps = steps.saturating_add(extra.ceil() as u64).max(steps + 1);
            break;
        }
        elapsed += capped;
        steps += 1;
        let grown = delay.as_secs_f64() * cfg.factor;
        delay = Duration::from_secs_f64(grown);
    }

    steps.clamp(1, MAX_STEPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let cfg = BackoffConfig {
            jitter: 0.0,
            ..BackoffConfig::default()
        };
        let mut b = Backoff::new(&cfg);
        let d1 = b.next().unwrap();
        let d2 = b.next().unwrap();
        assert_eq!(d1, Duration::from_millis(500));
        assert!(d2 > d1);
        // after enough steps, delay should be clamped at max_delay
        let capped = b.by_ref().take(50).last().unwrap();
        assert!(capped <= cfg.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = BackoffConfig::default();
        let mut b = Backoff::new(&cfg);
        for _ in 0..20 {
            let d = b.next().unwrap();
            let lower = cfg.initial_delay.as_secs_f64() * (1.0 - cfg.jitter) * 0.99;
            assert!(d.as_secs_f64() >= lower || d <= cfg.max_delay);
        }
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        assert_eq!(step_count(&BackoffConfig::default(), Duration::ZERO), MAX_STEPS);
    }

    #[test]
    fn step_count_is_bounded_and_positive() {
        let cfg = BackoffConfig::default();
        let steps = step_count(&cfg, Duration::from_secs(30));
        assert!(steps > 0);
        assert!(steps < MAX_STEPS);
    }
}
