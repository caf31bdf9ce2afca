//! Exponential back-off with jitter.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Default first retry interval.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default growth factor between intervals.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default jitter; an interval `i` is drawn from `[i * (1 - r), i * (1 + r)]`.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Exponential back-off schedule bounded by a total elapsed time.
///
/// Intervals grow by `multiplier` up to `max_interval`. Once `max_elapsed`
/// has passed since the last [`reset`](Self::reset), [`next_backoff`]
/// returns `None`. The final interval is clamped to the time remaining, so a
/// caller that keeps retrying gives up no earlier than `max_elapsed`.
///
/// [`next_backoff`]: Self::next_backoff
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    current_interval: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    /// Create a schedule with default growth and jitter.
    pub fn new(max_interval: Duration, max_elapsed: Duration) -> Self {
        let mut backoff = Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval,
            max_elapsed,
            current_interval: DEFAULT_INITIAL_INTERVAL,
            started: Instant::now(),
        };
        backoff.reset();
        backoff
    }

    /// Schedule for an overall timeout: intervals capped at a third of it.
    pub fn for_timeout(timeout: Duration) -> Self {
        Self::new(timeout / 3, timeout)
    }

    /// Set the first interval.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self.reset();
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter factor, clamped to `[0, 1]`.
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Restart the schedule from the first interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval.min(self.max_interval);
        self.started = Instant::now();
    }

    /// Time since the schedule started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Upper bound on the total elapsed time.
    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Next wait, or `None` once the elapsed budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        if elapsed >= self.max_elapsed {
            return None;
        }
        let remaining = self.max_elapsed - elapsed;

        let interval = self.randomized(self.current_interval);
        self.grow();

        Some(interval.min(remaining))
    }

    fn randomized(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 || interval.is_zero() {
            return interval;
        }
        let delta = interval.as_secs_f64() * self.randomization_factor;
        let low = interval.as_secs_f64() - delta;
        let high = interval.as_secs_f64() + delta;
        let secs = rand::thread_rng().gen_range(low..=high);
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn grow(&mut self) {
        let next = self.current_interval.as_secs_f64() * self.multiplier;
        if next >= self.max_interval.as_secs_f64() {
            self.current_interval = self.max_interval;
        } else {
            self.current_interval = Duration::from_secs_f64(next);
        }
    }
}
