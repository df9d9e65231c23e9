//! Clock abstraction so the supervisor's interval and idle-timeout logic can
//! run against virtual time in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock implementation used in production.
#[derive(Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic tests. `sleep` advances time instead of
/// blocking.
pub struct TestClock {
    current: Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        std::thread::yield_now();
    }
}

pub fn real_clock() -> SharedClock {
    Arc::new(RealClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_on_sleep() {
        let clock = TestClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(7));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(7));
    }
}
