//! Time contract (spec §9): usage records read wall-clock seconds since the
//! Unix epoch; state-machine timeouts read a monotonic clock. Both are
//! injected so tests can fake them.

use embassy_time::Instant;

/// Seconds since the Unix epoch, for `UsageRecord` timestamps.
pub trait WallClock {
    fn now_epoch_s(&self) -> i64;
}

/// Monotonic instants, for state-machine timeouts (Denied 5 s, Active 8 h,
/// relay pulse 50 ms, reader ticks).
pub trait MonotonicClock {
    fn now(&self) -> Instant;
}

impl<T: WallClock + ?Sized> WallClock for &T {
    fn now_epoch_s(&self) -> i64 {
        (**self).now_epoch_s()
    }
}

/// `embassy_time::Instant::now()`-backed monotonic clock, for the device and
/// for host builds that enable the `std` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyMonotonicClock;

impl MonotonicClock for EmbassyMonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: MonotonicClock + ?Sized> MonotonicClock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use core::cell::Cell;

    #[derive(Debug, Default)]
    pub struct FakeWallClock {
        epoch_s: Cell<i64>,
    }

    impl FakeWallClock {
        pub fn new(epoch_s: i64) -> Self {
            Self {
                epoch_s: Cell::new(epoch_s),
            }
        }

        pub fn set(&self, epoch_s: i64) {
            self.epoch_s.set(epoch_s);
        }

        pub fn advance(&self, delta_s: i64) {
            self.epoch_s.set(self.epoch_s.get() + delta_s);
        }
    }

    impl WallClock for FakeWallClock {
        fn now_epoch_s(&self) -> i64 {
            self.epoch_s.get()
        }
    }

    #[derive(Debug)]
    pub struct FakeMonotonicClock {
        now: Cell<Instant>,
    }

    impl FakeMonotonicClock {
        pub fn new() -> Self {
            Self {
                now: Cell::new(Instant::from_secs(0)),
            }
        }

        pub fn advance(&self, duration: embassy_time::Duration) {
            self.now.set(self.now.get() + duration);
        }
    }

    impl Default for FakeMonotonicClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MonotonicClock for FakeMonotonicClock {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }
}
