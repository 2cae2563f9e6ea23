//! Simulated time.
//!
//! The kernel keeps a single time cursor in picoseconds. Configuration and test code speak in
//! the units the waveform viewer would show (`ns` for a 250 MHz clock), so this module carries
//! both the raw cursor type and the unit conversions.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Time unit used by configuration values and delay helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Picoseconds (kernel resolution).
    Ps,
    /// Nanoseconds.
    #[default]
    Ns,
    /// Microseconds.
    Us,
    /// Milliseconds.
    Ms,
}

impl TimeUnit {
    /// Number of picoseconds in one unit.
    pub const fn picos(self) -> u64 {
        match self {
            Self::Ps => 1,
            Self::Ns => 1_000,
            Self::Us => 1_000_000,
            Self::Ms => 1_000_000_000,
        }
    }
}

/// A point on (or a span of) the simulated time axis, in picoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    /// Time zero.
    pub const ZERO: Self = Self(0);

    /// Creates a time value from an amount and a unit.
    pub const fn new(amount: u64, unit: TimeUnit) -> Self {
        Self(amount.saturating_mul(unit.picos()))
    }

    /// Creates a time value in nanoseconds.
    pub const fn from_ns(ns: u64) -> Self {
        Self::new(ns, TimeUnit::Ns)
    }

    /// Returns the raw picosecond count.
    #[inline(always)]
    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// Returns the value in whole units of `unit`, truncating.
    pub const fn in_unit(self, unit: TimeUnit) -> u64 {
        self.0 / unit.picos()
    }

    /// Adds a span, saturating at the end of time instead of wrapping.
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Add for SimTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, suffix) in [
            (TimeUnit::Ms, "ms"),
            (TimeUnit::Us, "us"),
            (TimeUnit::Ns, "ns"),
        ] {
            if self.0 != 0 && self.0 % unit.picos() == 0 {
                return write!(f, "{} {}", self.0 / unit.picos(), suffix);
            }
        }
        write!(f, "{} ps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_picks_the_coarsest_exact_unit() {
        assert_eq!(SimTime::from_ns(456).to_string(), "456 ns");
        assert_eq!(SimTime::new(2, TimeUnit::Us).to_string(), "2 us");
        assert_eq!(SimTime(1500).to_string(), "1500 ps");
        assert_eq!(SimTime::ZERO.to_string(), "0 ps");
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(SimTime(u64::MAX) + SimTime(1), SimTime(u64::MAX));
        assert_eq!(SimTime(1) - SimTime(5), SimTime::ZERO);
    }
}
