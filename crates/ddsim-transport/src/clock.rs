//! # Simulation Clock
//!
//! Logical clock that only moves when told to. Nothing advances it from
//! wall-clock time, so a run driven by the same sequence of `set`/`advance`
//! calls always observes the same timestamps.
//!
//! Guarded by a single mutex so concurrent senders can read it; a read may be
//! stale by at most one in-flight `advance`.

use crate::time::{FixedPointTime, NANOSECONDS_PER_SEC};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug)]
pub struct SimulationClock {
    now: Mutex<FixedPointTime>,
}

impl SimulationClock {
    /// Clock starting at zero.
    pub fn new() -> Self {
        Self::starting_at(FixedPointTime::ZERO)
    }

    pub fn starting_at(t: FixedPointTime) -> Self {
        SimulationClock { now: Mutex::new(t) }
    }

    pub fn now(&self) -> FixedPointTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current time unconditionally.
    pub fn set(&self, t: FixedPointTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    /// Advance by `delta_ns` nanoseconds, carrying whole seconds.
    pub fn advance(&self, delta_ns: u64) {
        let secs = (delta_ns / NANOSECONDS_PER_SEC).min(i32::MAX as u64) as i32;
        let nanos = (delta_ns % NANOSECONDS_PER_SEC) as u32;
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        now.increment(secs, nanos);
    }

    pub fn advance_by(&self, delta: Duration) {
        self.advance(delta.as_nanos().min(u64::MAX as u128) as u64);
    }

    pub fn reset(&self) {
        self.set(FixedPointTime::ZERO);
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_zero() {
        let clock = SimulationClock::new();
        assert_eq!(clock.now(), FixedPointTime::ZERO);
    }

    #[test]
    fn set_pins_the_clock() {
        let clock = SimulationClock::new();
        clock.set(FixedPointTime::new(42, 7));
        assert_eq!(clock.now(), FixedPointTime::new(42, 7));
        assert_eq!(clock.now(), FixedPointTime::new(42, 7));
    }

    #[test]
    fn advance_carries_into_seconds() {
        let clock = SimulationClock::starting_at(FixedPointTime::new(5, 900_000_000));
        clock.advance(200_000_000);
        assert_eq!(clock.now(), FixedPointTime::new(6, 100_000_000));

        clock.advance(2_500_000_000);
        assert_eq!(clock.now(), FixedPointTime::new(8, 600_000_000));
    }

    #[test]
    fn advance_by_duration_and_reset() {
        let clock = SimulationClock::new();
        clock.advance_by(Duration::from_millis(1500));
        assert_eq!(clock.now(), FixedPointTime::new(1, 500_000_000));
        clock.reset();
        assert_eq!(clock.now(), FixedPointTime::ZERO);
    }

    #[test]
    fn concurrent_advances_are_not_lost() {
        let clock = Arc::new(SimulationClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        clock.advance(1_000_000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(clock.now(), FixedPointTime::new(4, 0));
    }
}
