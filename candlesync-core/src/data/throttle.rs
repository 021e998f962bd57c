//! Request pacing for the provider's rate limit.
//!
//! Enforces a minimum spacing between consecutive requests. The first call
//! also waits the full interval, so a run never starts with a burst.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum-spacing limiter.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Default pacing: 500 ms between requests.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_millis(500))
    }

    /// No pacing at all.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a request is allowed, then record it.
    ///
    /// Returns how long the caller was held back.
    pub fn wait(&self) -> Duration {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let delay = match *last {
            None => self.min_interval,
            Some(at) => self.min_interval.saturating_sub(at.elapsed()),
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        *last = Some(Instant::now());
        delay
    }
}
