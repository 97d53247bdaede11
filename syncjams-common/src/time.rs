//! Monotonic clock abstraction.
//!
//! Mirrors the teacher's `nakamoto_common::block::time` surface
//! (`LocalTime`/`LocalDuration`/`Clock`) but is anchored to an arbitrary
//! process-local epoch rather than wall-clock time, since the protocol only
//! ever compares timestamps against each other (tick periods, peer timeouts,
//! throttle windows) and never needs to agree on an absolute time with peers.

use std::ops::{Add, Sub};
use std::time::{Duration, Instant};

/// A point in time, monotonic within one process.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct LocalTime(Duration);

impl LocalTime {
    /// The zero point of the local clock.
    pub const ZERO: LocalTime = LocalTime(Duration::ZERO);

    /// Construct from a floating point second count.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Seconds elapsed since the clock's zero point.
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl Default for LocalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add<LocalDuration> for LocalTime {
    type Output = LocalTime;

    fn add(self, rhs: LocalDuration) -> LocalTime {
        LocalTime(self.0 + rhs.0)
    }
}

/// Saturating difference: peers with clock jitter or mock clocks in tests
/// must never panic on `now - earlier` overflow.
impl Sub for LocalTime {
    type Output = LocalDuration;

    fn sub(self, rhs: LocalTime) -> LocalDuration {
        LocalDuration(self.0.saturating_sub(rhs.0))
    }
}

/// A span of time, always non-negative.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct LocalDuration(Duration);

impl LocalDuration {
    /// Zero-length duration.
    pub const ZERO: LocalDuration = LocalDuration(Duration::ZERO);

    /// Construct from whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Construct from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Construct from a floating point second count.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// This duration as floating point seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl Add for LocalDuration {
    type Output = LocalDuration;

    fn add(self, rhs: LocalDuration) -> LocalDuration {
        LocalDuration(self.0 + rhs.0)
    }
}

/// Anything that can report the current local time.
///
/// Parametrizing the engine over this trait (rather than calling
/// `Instant::now()` directly) is what lets tests drive tick consensus and
/// peer timeouts deterministically with a [`MockClock`].
pub trait Clock {
    /// The current local time.
    fn local_time(&self) -> LocalTime;
}

/// A [`Clock`] backed by the operating system's monotonic clock.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a clock whose zero point is "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn local_time(&self) -> LocalTime {
        LocalTime(self.epoch.elapsed())
    }
}

/// A [`Clock`] whose time is advanced explicitly, for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: std::cell::Cell<LocalTime>,
}

impl MockClock {
    /// Create a mock clock starting at [`LocalTime::ZERO`].
    pub fn new() -> Self {
        Self {
            now: std::cell::Cell::new(LocalTime::ZERO),
        }
    }

    /// Advance the clock by `dur`.
    pub fn advance(&self, dur: LocalDuration) {
        self.now.set(self.now.get() + dur);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, time: LocalTime) {
        self.now.set(time);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn local_time(&self) -> LocalTime {
        self.now.get()
    }
}

/// Lets a single clock be shared between an engine and the test driving it,
/// e.g. `Rc<MockClock>`.
impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn local_time(&self) -> LocalTime {
        (**self).local_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_arithmetic_is_saturating() {
        let earlier = LocalTime::from_secs_f64(5.0);
        let later = LocalTime::from_secs_f64(2.0);

        assert_eq!(later - earlier, LocalDuration::ZERO);
    }

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::new();
        clock.advance(LocalDuration::from_secs(3));

        assert_eq!(clock.local_time().as_secs_f64(), 3.0);
    }
}
