use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source for the control loop.
///
/// Everything that waits (acquisition pacing, calibration backoff, idle polling,
/// motion settle windows) goes through this trait so tests can run the loop
/// without real sleeps.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let ms = self.now().saturating_duration_since(epoch).as_millis();
        ms.min(u128::from(u64::MAX)) as u64
    }
}

/// Wall clock backed by `std::time::Instant` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic clock: `sleep` advances virtual time instead of blocking.
    ///
    /// Clones share the same timeline, so a test can keep one handle and give
    /// another to the code under test.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset_us: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset_us: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn advance(&self, d: Duration) {
            let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
            self.offset_us.fetch_add(us, Ordering::Relaxed);
        }

        /// Total virtual time elapsed since construction.
        pub fn elapsed(&self) -> Duration {
            Duration::from_micros(self.offset_us.load(Ordering::Relaxed))
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_shared_timeline() {
            let clock = TestClock::new();
            let other = clock.clone();
            let epoch = clock.now();
            other.sleep(Duration::from_millis(250));
            assert_eq!(clock.ms_since(epoch), 250);
        }
    }
}
