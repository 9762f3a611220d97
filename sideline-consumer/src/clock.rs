//! Time source capability for the flush timer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source consulted by the consumer's flush timer.
///
/// The default [`SystemClock`] reads the real monotonic clock; tests swap
/// in a [`SimulatedClock`] and advance it manually.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced [`Clock`] for tests.
///
/// Time stands still until [`SimulatedClock::advance`] is called, so tests
/// control exactly when the flush interval elapses.
#[derive(Debug)]
pub struct SimulatedClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl SimulatedClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().expect("clock lock poisoned");
        *elapsed += duration;
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Instant {
        let elapsed = *self.elapsed.lock().expect("clock lock poisoned");
        self.base + elapsed
    }
}
