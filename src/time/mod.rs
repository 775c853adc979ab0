//! System time and timeout intervals.
//!
//! Time is counted in kernel ticks on a wrapping 32-bit counter. Intervals
//! carry two reserved values: [`Interval::IMMEDIATE`] (never block) and
//! [`Interval::INFINITE`] (never time out).

use core::ops::Add;

/// Tick frequency the interval conversion helpers assume.
pub const TICK_FREQUENCY_HZ: u32 = 1000;

/// A point in system time, in ticks since kernel start.
///
/// The counter wraps; compare instants through [`SysTime::diff`], never with
/// `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SysTime(u32);

impl SysTime {
    /// Create an instant from a raw tick count.
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Raw tick count.
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Interval elapsed from `earlier` to `self`, modulo the counter width.
    pub const fn diff(self, earlier: SysTime) -> Interval {
        Interval(self.0.wrapping_sub(earlier.0))
    }

    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Add<Interval> for SysTime {
    type Output = Self;

    fn add(self, interval: Interval) -> Self {
        Self(self.0.wrapping_add(interval.0))
    }
}

/// A time interval in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(u32);

impl Interval {
    /// Do not wait: evaluate the condition and return at once.
    pub const IMMEDIATE: Interval = Interval(0);
    /// Wait forever.
    pub const INFINITE: Interval = Interval(u32::MAX);

    /// Create an interval from a tick count.
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Create an interval from milliseconds, rounding up to whole ticks.
    pub const fn from_millis(millis: u32) -> Self {
        let ticks = (millis as u64 * TICK_FREQUENCY_HZ as u64 + 999) / 1000;
        if ticks >= u32::MAX as u64 {
            Self(u32::MAX - 1)
        } else {
            Self(ticks as u32)
        }
    }

    /// Tick count.
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// `true` for the two reserved sentinels.
    pub const fn is_special(self) -> bool {
        self.0 == Self::IMMEDIATE.0 || self.0 == Self::INFINITE.0
    }
}
