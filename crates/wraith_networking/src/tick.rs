//! # Ticks
//!
//! Simulation step counter and the fixed-timestep clock that drives it.
//!
//! Ticks wrap modulo 2^32. Every ordering question goes through
//! [`Tick::diff`], which interprets the wrapped distance as signed, so a
//! tick is "newer" than another if it is less than 2^31 steps ahead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One simulation step.
///
/// Deliberately not `Ord`: raw comparison is wrong across the wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tick(pub u32);

impl Tick {
    /// Tick zero.
    pub const ZERO: Self = Self(0);

    /// Returns the tick `n` steps later.
    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// Returns the tick `n` steps earlier.
    #[inline]
    #[must_use]
    pub const fn wrapping_sub(self, n: u32) -> Self {
        Self(self.0.wrapping_sub(n))
    }

    /// Signed distance `self - other`, wrap-aware.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn diff(self, other: Self) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// True if `self` is strictly after `other`.
    #[inline]
    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        self.diff(other) > 0
    }

    /// Returns the newer of the two ticks.
    #[inline]
    #[must_use]
    pub const fn newest(self, other: Self) -> Self {
        if other.is_newer_than(self) {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickStats {
    /// Total ticks produced.
    pub total_ticks: u64,
    /// Ticks produced by a single `advance` beyond the first (catch-up).
    pub catch_up_ticks: u64,
    /// Largest number of ticks produced by one `advance`.
    pub max_burst: u32,
}

/// Fixed-timestep accumulator.
///
/// Feed it wall-clock deltas; it reports how many whole simulation steps
/// are due. A long stall is capped at `max_burst` steps so the loop does
/// not spiral.
pub struct TickClock {
    tick_duration: Duration,
    accumulator: Duration,
    max_burst: u32,
    stats: TickStats,
}

impl TickClock {
    /// Creates a clock for the given rate.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let rate = u64::from(tick_rate.max(1));
        Self {
            tick_duration: Duration::from_micros(1_000_000 / rate),
            accumulator: Duration::ZERO,
            max_burst: 8,
            stats: TickStats::default(),
        }
    }

    /// Adds elapsed time and returns the number of ticks now due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut due = 0u32;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            due += 1;
            if due == self.max_burst {
                self.accumulator = Duration::ZERO;
                break;
            }
        }

        self.stats.total_ticks += u64::from(due);
        self.stats.catch_up_ticks += u64::from(due.saturating_sub(1));
        self.stats.max_burst = self.stats.max_burst.max(due);
        due
    }

    /// Fraction of the next tick already accumulated, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulator.as_secs_f64() / self.tick_duration.as_secs_f64()
    }

    /// Target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_across_wrap() {
        let before = Tick(u32::MAX - 1);
        let after = before.wrapping_add(3);
        assert_eq!(after, Tick(1));
        assert_eq!(after.diff(before), 3);
        assert_eq!(before.diff(after), -3);
        assert!(after.is_newer_than(before));
        assert!(!before.is_newer_than(after));
        assert_eq!(before.newest(after), after);
    }

    #[test]
    fn test_equal_ticks_are_not_newer() {
        assert!(!Tick(5).is_newer_than(Tick(5)));
        assert_eq!(Tick(5).diff(Tick(5)), 0);
    }

    #[test]
    fn test_clock_accumulates() {
        let mut clock = TickClock::new(100);
        assert_eq!(clock.tick_duration(), Duration::from_millis(10));

        assert_eq!(clock.advance(Duration::from_millis(5)), 0);
        assert_eq!(clock.advance(Duration::from_millis(5)), 1);
        assert_eq!(clock.advance(Duration::from_millis(25)), 2);
        assert!((clock.alpha() - 0.5).abs() < 1e-9);
        assert_eq!(clock.stats().total_ticks, 3);
        assert_eq!(clock.stats().catch_up_ticks, 1);
    }

    #[test]
    fn test_clock_caps_burst() {
        let mut clock = TickClock::new(100);
        assert_eq!(clock.advance(Duration::from_secs(10)), 8);
        assert_eq!(clock.advance(Duration::ZERO), 0);
        assert_eq!(clock.stats().max_burst, 8);
    }
}
