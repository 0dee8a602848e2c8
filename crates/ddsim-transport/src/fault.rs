//! # Fault Injection Pipeline
//!
//! Decides, per outbound frame, whether to drop it, corrupt it and how long
//! to hold it before delivery.
//!
//! All randomness comes from one [`StdRng`] seeded from the descriptor, and
//! the decisions always consume it in the same order:
//!
//! ```text
//!   loss ──▶ corruption ──▶ delay (jitter, bandwidth, congestion)
//! ```
//!
//! so a fixed seed and a fixed send sequence reproduce the same run. State
//! that depends on history (burst countdown, periodic counters, congestion
//! factor) is kept per destination.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Duration;

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::Rng;
use rand::RngExt;
use rand::SeedableRng;

use crate::descriptor::{
    CongestionPattern, CorruptionPattern, DelayPattern, LossPattern, SimulatedDescriptor,
};
use crate::frame::Frame;

/// Frames per cycle of the periodic delay pattern.
pub const PERIODIC_DELAY_CYCLE: u64 = 64;
/// Growth of the congestion factor per frame over the window (gradual).
const CONGESTION_GROWTH: f64 = 1.25;
/// Ceiling of the congestion factor; sudden congestion jumps straight here.
pub const CONGESTION_CEILING: f64 = 8.0;
/// Upper bound on any simulated delay, after time scaling.
pub const MAX_SIMULATED_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

// ─── Decision ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FaultDecision {
    /// Discard the frame; nothing reaches the receive side.
    Drop,
    /// Deliver `frame` (possibly corrupted) after `delay`.
    Deliver {
        frame: Frame,
        delay: Duration,
        corrupted: bool,
    },
}

/// Per-destination history.
#[derive(Debug, Clone)]
struct LaneState {
    frames_seen: u64,
    burst_remaining: u32,
    congestion_factor: f64,
}

impl Default for LaneState {
    fn default() -> Self {
        Self {
            frames_seen: 0,
            burst_remaining: 0,
            congestion_factor: 1.0,
        }
    }
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

pub struct FaultInjectionPipeline {
    descriptor: SimulatedDescriptor,
    rng: StdRng,
    lanes: HashMap<String, LaneState>,
}

impl FaultInjectionPipeline {
    pub fn new(descriptor: SimulatedDescriptor) -> Self {
        let rng = StdRng::seed_from_u64(descriptor.seed);
        FaultInjectionPipeline {
            descriptor,
            rng,
            lanes: HashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &SimulatedDescriptor {
        &self.descriptor
    }

    /// Current congestion factor towards `destination` (1.0 when idle).
    pub fn congestion_factor(&self, destination: &str) -> f64 {
        self.lanes
            .get(destination)
            .map(|l| l.congestion_factor)
            .unwrap_or(1.0)
    }

    /// Decide the fate of `frame`.
    ///
    /// `occupancy_bytes` is the number of bytes already scheduled but not yet
    /// delivered to the frame's destination; it drives congestion.
    pub fn process(&mut self, frame: Frame, occupancy_bytes: u64) -> FaultDecision {
        let Self {
            descriptor: d,
            rng,
            lanes,
        } = self;
        let lane = lanes.entry(frame.destination.clone()).or_default();
        lane.frames_seen += 1;

        if decide_loss(d, rng, lane) {
            return FaultDecision::Drop;
        }

        let mut frame = frame;
        let mut corrupted = false;
        if rng.random::<f64>() < d.packet_corruption_rate {
            let mut buf = BytesMut::from(&frame.data[..]);
            corrupted = apply_corruption(
                &mut buf,
                d.corruption_pattern,
                d.corruption_data_ratio,
                d.corruption_header_len,
                rng,
            );
            if corrupted {
                frame.data = buf.freeze();
            }
        }

        let mut delay_ms = sample_delay(d, rng, lane.frames_seen);
        if d.bandwidth_limit_bps > 0 {
            let mut extra = serialization_delay_ms(frame.len(), d.bandwidth_limit_bps);
            if d.enable_congestion {
                update_congestion(d, lane, occupancy_bytes);
                extra *= lane.congestion_factor;
            }
            delay_ms += extra;
        }
        let max_ms = MAX_SIMULATED_DELAY.as_millis() as f64;
        let delay_ms = (delay_ms * d.time_scale_factor).clamp(0.0, max_ms);

        FaultDecision::Deliver {
            frame,
            delay: Duration::from_nanos((delay_ms * 1_000_000.0).round() as u64),
            corrupted,
        }
    }
}

// ─── Loss ───────────────────────────────────────────────────────────────────

fn decide_loss(d: &SimulatedDescriptor, rng: &mut impl Rng, lane: &mut LaneState) -> bool {
    match d.packet_loss_pattern {
        LossPattern::Random => rng.random::<f64>() < d.packet_loss_rate,
        LossPattern::Burst => {
            if lane.burst_remaining > 0 {
                lane.burst_remaining -= 1;
                return true;
            }
            if rng.random::<f64>() < d.packet_loss_rate {
                lane.burst_remaining = d.packet_loss_burst_length;
                true
            } else {
                false
            }
        }
        LossPattern::Periodic => match periodic_interval(d.packet_loss_rate) {
            Some(n) => lane.frames_seen % n == 0,
            None => false,
        },
    }
}

/// Drop interval for periodic loss: every `round(1 / rate)`-th frame.
/// `None` when the rate is zero.
pub fn periodic_interval(rate: f64) -> Option<u64> {
    if rate <= 0.0 || rate.is_nan() {
        None
    } else {
        Some(((1.0 / rate).round() as u64).max(1))
    }
}

// ─── Corruption ─────────────────────────────────────────────────────────────

/// Number of bytes to corrupt in a frame of `len` bytes: at least one when
/// the ratio is positive, never more than the frame.
pub fn corruption_span(ratio: f64, len: usize) -> usize {
    if ratio <= 0.0 || len == 0 {
        return 0;
    }
    ((ratio * len as f64).floor() as usize).clamp(1, len)
}

/// Corrupt one contiguous region of `data` in place. Every byte in the
/// region is changed. Returns whether anything was touched.
pub fn apply_corruption(
    data: &mut [u8],
    pattern: CorruptionPattern,
    ratio: f64,
    header_len: usize,
    rng: &mut impl Rng,
) -> bool {
    let window = match pattern {
        CorruptionPattern::HeaderCorrupt => header_len.min(data.len()),
        _ => data.len(),
    };
    let span = corruption_span(ratio, data.len()).min(window);
    if span == 0 {
        return false;
    }
    let start = if window > span {
        rng.random_range(0..=window - span)
    } else {
        0
    };
    for byte in &mut data[start..start + span] {
        match pattern {
            CorruptionPattern::BitFlip => *byte ^= 1u8 << rng.random_range(0..8u32),
            CorruptionPattern::ByteCorrupt | CorruptionPattern::HeaderCorrupt => {
                *byte ^= rng.random_range(1..=255u8)
            }
        }
    }
    true
}

// ─── Delay ──────────────────────────────────────────────────────────────────

/// Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0_f64 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Base delay in milliseconds for the `n`-th frame of a destination.
fn sample_delay(d: &SimulatedDescriptor, rng: &mut impl Rng, n: u64) -> f64 {
    let base = d.network_delay_ms as f64;
    let jitter = d.delay_jitter_ms as f64;
    let ms = match d.delay_pattern {
        DelayPattern::Fixed => base,
        DelayPattern::Normal => base + jitter * standard_normal(rng),
        DelayPattern::Periodic => base + jitter * periodic_phase(n),
    };
    ms.max(0.0)
}

/// `sin(2π · n / cycle)` for the periodic delay pattern.
pub fn periodic_phase(n: u64) -> f64 {
    let pos = (n % PERIODIC_DELAY_CYCLE) as f64 / PERIODIC_DELAY_CYCLE as f64;
    (2.0 * PI * pos).sin()
}

/// Time to put `len` bytes on a link of `bps` bits per second, in ms.
pub fn serialization_delay_ms(len: usize, bps: u64) -> f64 {
    if bps == 0 {
        return 0.0;
    }
    (len as f64 * 8.0 / bps as f64) * 1000.0
}

fn update_congestion(d: &SimulatedDescriptor, lane: &mut LaneState, occupancy_bytes: u64) {
    lane.congestion_factor = next_congestion_factor(
        lane.congestion_factor,
        occupancy_bytes,
        d.congestion_window_size as u64,
        d.congestion_pattern,
        d.congestion_recovery_factor,
    );
}

/// Congestion factor after observing `occupancy` bytes in flight.
///
/// Over the window the factor grows (gradual) or jumps to the ceiling
/// (sudden); at or under the window it decays toward 1.0.
pub fn next_congestion_factor(
    factor: f64,
    occupancy: u64,
    window: u64,
    pattern: CongestionPattern,
    recovery: f64,
) -> f64 {
    if occupancy > window {
        match pattern {
            CongestionPattern::Gradual => (factor * CONGESTION_GROWTH).min(CONGESTION_CEILING),
            CongestionPattern::Sudden => CONGESTION_CEILING,
        }
    } else {
        1.0 + (factor - 1.0) / (1.0 + recovery)
    }
}
