//! # Fixed-Point Time
//!
//! Seconds + sub-second time value used for protocol timestamps and for the
//! simulation clock. The sub-second part is kept in two views at once:
//!
//! - `nanosec` — nanoseconds, `0..1_000_000_000`
//! - `fraction` — binary fraction of a second, `fraction / 2^32`
//!
//! Setting one view derives the other. When the nanosecond view is set, the
//! derived fraction is nudged upward until converting it back reproduces the
//! exact nanosecond value, so `nanosec -> fraction -> nanosec` is lossless.
//!
//! Two sentinels exist: [`FixedPointTime::INFINITE`] and
//! [`FixedPointTime::INVALID`]. They map to `-1` and `-2` in
//! [`FixedPointTime::to_nanoseconds`].

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};
use std::time::Duration;

/// Nanoseconds in one second.
pub const NANOSECONDS_PER_SEC: u64 = 1_000_000_000;
/// Binary fractions in one second (2^32).
pub const FRACTIONS_PER_SEC: u64 = 1 << 32;

const INFINITE_SECONDS: i32 = 0x7fff_ffff;
const INFINITE_NANOSECONDS: u32 = 0xffff_ffff;

/// Convert a binary fraction of a second to nanoseconds (truncating).
pub fn frac_to_nano(fraction: u32) -> u32 {
    ((fraction as u64 * NANOSECONDS_PER_SEC) / FRACTIONS_PER_SEC) as u32
}

/// Convert nanoseconds (`< 1e9`) to a binary fraction of a second (truncating).
pub fn nano_to_frac(nanosec: u32) -> u32 {
    ((nanosec as u64 * FRACTIONS_PER_SEC) / NANOSECONDS_PER_SEC) as u32
}

// ─── FixedPointTime ─────────────────────────────────────────────────────────

/// Seconds plus a sub-second value held as both nanoseconds and a 32-bit
/// binary fraction.
///
/// Equality, ordering and hashing only look at `(seconds, nanosec)`; the
/// fraction is a derived view.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FixedPointTime {
    seconds: i32,
    nanosec: u32,
    fraction: u32,
}

impl FixedPointTime {
    /// `{0, 0}`.
    pub const ZERO: Self = FixedPointTime {
        seconds: 0,
        nanosec: 0,
        fraction: 0,
    };

    /// Infinite time: `seconds = 0x7fffffff`, `nanosec = 0xffffffff`.
    pub const INFINITE: Self = FixedPointTime {
        seconds: INFINITE_SECONDS,
        nanosec: INFINITE_NANOSECONDS,
        fraction: u32::MAX,
    };

    /// Invalid time: `seconds = -1`, `nanosec = 0xffffffff`.
    pub const INVALID: Self = FixedPointTime {
        seconds: -1,
        nanosec: INFINITE_NANOSECONDS,
        fraction: u32::MAX,
    };

    /// Create from seconds and nanoseconds. Nanoseconds of a second or more
    /// are carried into `seconds`; `0xffffffff` is kept as the sentinel.
    /// With infinite seconds nothing is carried and the nanoseconds are
    /// reduced modulo one second.
    pub fn new(seconds: i32, nanosec: u32) -> Self {
        let mut t = FixedPointTime {
            seconds,
            nanosec: 0,
            fraction: 0,
        };
        if nanosec == INFINITE_NANOSECONDS || seconds == INFINITE_SECONDS {
            t.set_nanosec(nanosec);
        } else {
            t.increment(0, nanosec);
        }
        t
    }

    /// Create from seconds and a binary fraction of a second.
    pub fn from_fraction(seconds: i32, fraction: u32) -> Self {
        let mut t = FixedPointTime {
            seconds,
            nanosec: 0,
            fraction: 0,
        };
        t.set_fraction(fraction);
        t
    }

    /// Create from a decimal number of seconds.
    ///
    /// Seconds are floored so the sub-second part is never negative; the
    /// sub-second part is truncated to whole nanoseconds and the fraction is
    /// derived from it. NaN yields [`Self::INVALID`], +∞ [`Self::INFINITE`].
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() {
            return Self::INVALID;
        }
        if secs.is_infinite() {
            return if secs > 0.0 {
                Self::INFINITE
            } else {
                Self::INVALID
            };
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * NANOSECONDS_PER_SEC as f64) as u32;
        Self::new(whole as i32, nanos.min(NANOSECONDS_PER_SEC as u32 - 1))
    }

    pub fn seconds(&self) -> i32 {
        self.seconds
    }

    pub fn nanosec(&self) -> u32 {
        self.nanosec
    }

    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    pub fn set_seconds(&mut self, seconds: i32) {
        self.seconds = seconds;
    }

    /// Set the nanosecond view and derive the fraction.
    ///
    /// Values of a second or more are reduced modulo one second (the
    /// `0xffffffff` sentinel is stored as is).
    pub fn set_nanosec(&mut self, nanosec: u32) {
        if nanosec == INFINITE_NANOSECONDS {
            self.nanosec = INFINITE_NANOSECONDS;
            self.fraction = u32::MAX;
            return;
        }
        let nanosec = nanosec % NANOSECONDS_PER_SEC as u32;
        self.nanosec = nanosec;

        let mut fraction = nano_to_frac(nanosec);
        while frac_to_nano(fraction) != nanosec && fraction < u32::MAX {
            fraction += 1;
        }
        self.fraction = fraction;
    }

    /// Set the fraction view and derive nanoseconds.
    pub fn set_fraction(&mut self, fraction: u32) {
        self.fraction = fraction;
        self.nanosec = if fraction == u32::MAX {
            INFINITE_NANOSECONDS
        } else {
            frac_to_nano(fraction)
        };
    }

    /// `seconds == 0x7fffffff || nanosec == 0xffffffff`.
    ///
    /// Note that [`Self::INVALID`] also satisfies this; use
    /// [`Self::is_invalid`] first when the distinction matters.
    pub fn is_infinite(&self) -> bool {
        self.seconds == INFINITE_SECONDS || self.nanosec == INFINITE_NANOSECONDS
    }

    pub fn is_invalid(&self) -> bool {
        self.seconds == -1 && self.nanosec == INFINITE_NANOSECONDS
    }

    /// Total nanoseconds, or `-1` for infinite and `-2` for invalid.
    pub fn to_nanoseconds(&self) -> i64 {
        if self.is_invalid() {
            return -2;
        }
        if self.is_infinite() {
            return -1;
        }
        self.seconds as i64 * NANOSECONDS_PER_SEC as i64 + self.nanosec as i64
    }

    /// Inverse of [`Self::to_nanoseconds`].
    ///
    /// `-1` and `-2` map back to the sentinels; everything else is split by
    /// floor division so the nanosecond remainder is never negative.
    pub fn from_nanoseconds(nanos: i64) -> Self {
        match nanos {
            -1 => Self::INFINITE,
            -2 => Self::INVALID,
            _ => {
                let per_sec = NANOSECONDS_PER_SEC as i64;
                let seconds = nanos.div_euclid(per_sec);
                let rem = nanos.rem_euclid(per_sec);
                Self::new(seconds as i32, rem as u32)
            }
        }
    }

    /// Add `sec` seconds and `nsec` nanoseconds. Whole seconds in the
    /// nanosecond sum are carried; sentinels are left untouched.
    pub fn increment(&mut self, sec: i32, nsec: u32) {
        if self.is_infinite() {
            return;
        }
        let total = self.nanosec as u64 + nsec as u64;
        let carry = (total / NANOSECONDS_PER_SEC) as i32;
        self.seconds = self.seconds.saturating_add(sec).saturating_add(carry);
        self.set_nanosec((total % NANOSECONDS_PER_SEC) as u32);
    }

    /// Convert to a [`Duration`]. `None` for sentinels and negative times.
    pub fn to_duration(&self) -> Option<Duration> {
        if self.is_infinite() || self.seconds < 0 {
            return None;
        }
        Some(Duration::new(self.seconds as u64, self.nanosec))
    }

    fn sentinel_of(a: &Self, b: &Self) -> Option<Self> {
        if a.is_invalid() || b.is_invalid() {
            Some(Self::INVALID)
        } else if a.is_infinite() || b.is_infinite() {
            Some(Self::INFINITE)
        } else {
            None
        }
    }
}

impl Default for FixedPointTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Duration> for FixedPointTime {
    fn from(d: Duration) -> Self {
        if d.as_secs() >= INFINITE_SECONDS as u64 {
            return Self::INFINITE;
        }
        Self::new(d.as_secs() as i32, d.subsec_nanos())
    }
}

impl PartialEq for FixedPointTime {
    fn eq(&self, other: &Self) -> bool {
        self.seconds == other.seconds && self.nanosec == other.nanosec
    }
}

impl Eq for FixedPointTime {}

impl Hash for FixedPointTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seconds.hash(state);
        self.nanosec.hash(state);
    }
}

impl Ord for FixedPointTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then(self.nanosec.cmp(&other.nanosec))
    }
}

impl PartialOrd for FixedPointTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for FixedPointTime {
    type Output = FixedPointTime;

    fn add(self, rhs: Self) -> Self {
        if let Some(sentinel) = Self::sentinel_of(&self, &rhs) {
            return sentinel;
        }
        let mut out = self;
        out.increment(rhs.seconds, rhs.nanosec);
        out
    }
}

impl Sub for FixedPointTime {
    type Output = FixedPointTime;

    fn sub(self, rhs: Self) -> Self {
        if let Some(sentinel) = Self::sentinel_of(&self, &rhs) {
            return sentinel;
        }
        let mut seconds = self.seconds.saturating_sub(rhs.seconds);
        let nanosec = if self.nanosec >= rhs.nanosec {
            self.nanosec - rhs.nanosec
        } else {
            seconds = seconds.saturating_sub(1);
            self.nanosec + NANOSECONDS_PER_SEC as u32 - rhs.nanosec
        };
        Self::new(seconds, nanosec)
    }
}

impl fmt::Display for FixedPointTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return write!(f, "invalid");
        }
        if self.is_infinite() {
            return write!(f, "infinite");
        }
        let secs = self.seconds as f64 + self.nanosec as f64 / NANOSECONDS_PER_SEC as f64;
        write!(f, "{secs}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_carries_whole_seconds() {
        let mut t = FixedPointTime::new(5, 900_000_000);
        t.increment(0, 200_000_000);
        assert_eq!(t, FixedPointTime::new(6, 100_000_000));
        assert_eq!(t.seconds(), 6);
        assert_eq!(t.nanosec(), 100_000_000);
    }

    #[test]
    fn increment_carries_multiple_seconds() {
        let mut t = FixedPointTime::new(0, 999_999_999);
        t.increment(1, 3_000_000_001);
        assert_eq!(t.seconds(), 5);
        assert_eq!(t.nanosec(), 0);
    }

    #[test]
    fn new_normalizes_overflowing_nanoseconds() {
        let t = FixedPointTime::new(1, 2_500_000_000);
        assert_eq!(t.seconds(), 3);
        assert_eq!(t.nanosec(), 500_000_000);
    }

    #[test]
    fn infinite_seconds_keep_nanoseconds() {
        let t = FixedPointTime::new(0x7fff_ffff, 250);
        assert_eq!(t.seconds(), 0x7fff_ffff);
        assert_eq!(t.nanosec(), 250);
        assert_eq!(frac_to_nano(t.fraction()), 250);
        assert!(t.is_infinite());

        let t = FixedPointTime::new(0x7fff_ffff, 1_000_000_007);
        assert_eq!(t.seconds(), 0x7fff_ffff);
        assert_eq!(t.nanosec(), 7);
    }

    #[test]
    fn nanosecond_roundtrip_plain_values() {
        for t in [
            FixedPointTime::ZERO,
            FixedPointTime::new(1, 1),
            FixedPointTime::new(42, 999_999_999),
            FixedPointTime::new(-7, 250_000_000),
            FixedPointTime::new(i32::MAX - 1, 123),
        ] {
            assert_eq!(FixedPointTime::from_nanoseconds(t.to_nanoseconds()), t);
        }
    }

    #[test]
    fn sentinels_map_to_reserved_values() {
        assert_eq!(FixedPointTime::INFINITE.to_nanoseconds(), -1);
        assert_eq!(FixedPointTime::INVALID.to_nanoseconds(), -2);
        assert!(FixedPointTime::from_nanoseconds(-1).is_infinite());
        assert!(FixedPointTime::from_nanoseconds(-2).is_invalid());
        // Infinite seconds alone is enough.
        assert_eq!(FixedPointTime::new(0x7fff_ffff, 5).to_nanoseconds(), -1);
    }

    #[test]
    fn from_nanoseconds_floors_negative_values() {
        let t = FixedPointTime::from_nanoseconds(-1_500_000_000);
        assert_eq!(t.seconds(), -2);
        assert_eq!(t.nanosec(), 500_000_000);
    }

    #[test]
    fn fraction_views_agree() {
        let half = FixedPointTime::new(0, 500_000_000);
        assert_eq!(half.fraction(), 0x8000_0000);

        let t = FixedPointTime::from_fraction(3, 0x4000_0000);
        assert_eq!(t.nanosec(), 250_000_000);
        assert_eq!(t.seconds(), 3);
    }

    #[test]
    fn set_nanosec_fraction_reproduces_nanoseconds() {
        let mut t = FixedPointTime::ZERO;
        for nanos in [1u32, 3, 7, 999, 123_456_789, 999_999_999] {
            t.set_nanosec(nanos);
            assert_eq!(frac_to_nano(t.fraction()), nanos, "nanos={nanos}");
        }
    }

    #[test]
    fn set_nanosec_reduces_modulo_one_second() {
        let mut t = FixedPointTime::new(2, 0);
        t.set_nanosec(1_000_000_123);
        assert_eq!(t.nanosec(), 123);
        assert_eq!(t.seconds(), 2);
    }

    #[test]
    fn from_secs_f64_truncates_fraction() {
        let t = FixedPointTime::from_secs_f64(1.25);
        assert_eq!(t, FixedPointTime::new(1, 250_000_000));

        let neg = FixedPointTime::from_secs_f64(-1.5);
        assert_eq!(neg, FixedPointTime::new(-2, 500_000_000));

        assert!(FixedPointTime::from_secs_f64(f64::NAN).is_invalid());
        assert!(FixedPointTime::from_secs_f64(f64::INFINITY).is_infinite());
    }

    #[test]
    fn ordering_by_seconds_then_nanoseconds() {
        let a = FixedPointTime::new(1, 999_999_999);
        let b = FixedPointTime::new(2, 0);
        let c = FixedPointTime::new(2, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(c > a);
        assert!(b <= FixedPointTime::new(2, 0));
        assert_ne!(a, b);
    }

    #[test]
    fn equality_ignores_fraction_view() {
        // Two fractions that truncate to the same nanosecond.
        let a = FixedPointTime::from_fraction(0, 5);
        let b = FixedPointTime::from_fraction(0, 6);
        assert_eq!(a.nanosec(), b.nanosec());
        assert_eq!(a, b);
    }

    #[test]
    fn add_and_sub_carry_and_borrow() {
        let a = FixedPointTime::new(1, 600_000_000);
        let b = FixedPointTime::new(2, 700_000_000);
        assert_eq!(a + b, FixedPointTime::new(4, 300_000_000));
        assert_eq!(b - a, FixedPointTime::new(1, 100_000_000));
        assert_eq!(a - b, FixedPointTime::new(-2, 900_000_000));
        assert_eq!((a - b).to_nanoseconds(), -1_100_000_000);
    }

    #[test]
    fn sentinels_propagate_through_arithmetic() {
        let t = FixedPointTime::new(1, 0);
        assert!((t + FixedPointTime::INFINITE).is_infinite());
        assert!((FixedPointTime::INVALID - t).is_invalid());

        let mut inf = FixedPointTime::INFINITE;
        inf.increment(1, 1);
        assert_eq!(inf, FixedPointTime::INFINITE);
    }

    #[test]
    fn duration_conversions() {
        let t = FixedPointTime::from(Duration::from_millis(1_500));
        assert_eq!(t, FixedPointTime::new(1, 500_000_000));
        assert_eq!(t.to_duration(), Some(Duration::from_millis(1_500)));
        assert_eq!(FixedPointTime::new(-1, 0).to_duration(), None);
        assert_eq!(FixedPointTime::INFINITE.to_duration(), None);
    }

    #[test]
    fn display_renders_decimal_seconds() {
        assert_eq!(FixedPointTime::new(2, 500_000_000).to_string(), "2.5");
        assert_eq!(FixedPointTime::INFINITE.to_string(), "infinite");
        assert_eq!(FixedPointTime::INVALID.to_string(), "invalid");
    }
}
