//! Property-based tests for fixed-point time.
//!
//! Round trips between the nanosecond total and the structured form, the
//! carry rule of `increment`, and the two sub-second views.

use ddsim_transport::time::{frac_to_nano, nano_to_frac, NANOSECONDS_PER_SEC};
use ddsim_transport::FixedPointTime;
use proptest::prelude::*;

/// Finite, non-sentinel times.
fn finite_time() -> impl Strategy<Value = FixedPointTime> {
    (-1_000_000i32..0x7fff_fff0, 0u32..1_000_000_000)
        .prop_filter("not a sentinel", |(s, _)| *s != -1)
        .prop_map(|(s, n)| FixedPointTime::new(s, n))
}

fn nanos() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(0u32),
        Just(1),
        Just(999_999_999),
        Just(500_000_000),
        0u32..1_000_000_000,
    ]
}

proptest! {
    #[test]
    fn nanoseconds_roundtrip(t in finite_time()) {
        let back = FixedPointTime::from_nanoseconds(t.to_nanoseconds());
        prop_assert_eq!(back, t);
        prop_assert_eq!(back.fraction(), t.fraction());
    }

    #[test]
    fn from_nanoseconds_remainder_is_non_negative(n in -10_000_000_000_000i64..10_000_000_000_000) {
        prop_assume!(n != -1 && n != -2);
        let t = FixedPointTime::from_nanoseconds(n);
        prop_assert!(t.nanosec() < 1_000_000_000);
        prop_assert_eq!(t.to_nanoseconds(), n);
    }

    #[test]
    fn increment_carries_whole_seconds(
        seconds in -1_000i32..1_000_000,
        start in nanos(),
        add in 0u32..4_000_000_000,
    ) {
        prop_assume!(seconds != -1);
        let mut t = FixedPointTime::new(seconds, start);
        t.increment(0, add);

        let total = start as u64 + add as u64;
        prop_assert_eq!(t.seconds() as i64, seconds as i64 + (total / NANOSECONDS_PER_SEC) as i64);
        prop_assert_eq!(t.nanosec() as u64, total % NANOSECONDS_PER_SEC);
    }

    #[test]
    fn nanosec_view_survives_fraction_roundtrip(n in nanos()) {
        let mut t = FixedPointTime::ZERO;
        t.set_nanosec(n);
        prop_assert_eq!(frac_to_nano(t.fraction()), n);
        // The adjusted fraction never moves below the plain conversion.
        prop_assert!(t.fraction() >= nano_to_frac(n));
    }

    #[test]
    fn add_then_sub_is_identity(a in finite_time(), b in 0i32..1_000_000, bn in nanos()) {
        let delta = FixedPointTime::new(b, bn);
        prop_assume!(a.seconds() < 0x7fff_fff0 - 1_000_001);
        prop_assert_eq!((a + delta) - delta, a);
    }

    #[test]
    fn ordering_matches_nanosecond_totals(a in finite_time(), b in finite_time()) {
        prop_assert_eq!(a.cmp(&b), a.to_nanoseconds().cmp(&b.to_nanoseconds()));
    }
}
