//! Fixed-interval gate between consecutive reboot calls.

use std::time::{Duration, Instant};

/// Time source for [`Pacer`]. `now` is monotonic and relative to an
/// arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Lets a call through once at least `interval` has passed since the
/// previous one. The first call never waits.
#[derive(Debug)]
pub struct Pacer<C: Clock> {
    clock: C,
    interval: Duration,
    last: Option<Duration>,
}

impl<C: Clock> Pacer<C> {
    pub fn new(clock: C, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the next call is allowed and returns how long it waited.
    pub fn wait(&mut self) -> Duration {
        let mut waited = Duration::ZERO;
        if let Some(last) = self.last {
            let elapsed = self.clock.now().saturating_sub(last);
            if elapsed < self.interval {
                waited = self.interval - elapsed;
                self.clock.sleep(waited);
            }
        }
        self.last = Some(self.clock.now());
        waited
    }
}

/// Virtual clock for tests: `sleep` advances time instantly.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
