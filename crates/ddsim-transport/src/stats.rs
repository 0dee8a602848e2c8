//! # Transport Statistics
//!
//! Lock-free counters updated on the send, scheduling and receive paths.
//! [`TransportStats::snapshot`] produces a plain struct for JSON output.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped: AtomicU64,
    corrupted: AtomicU64,
    delayed: AtomicU64,
    delivered: AtomicU64,
    injected: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupted(&self) {
        self.corrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delayed(&self) {
        self.delayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_injected(&self) {
        self.injected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            frames_sent: self.sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            frames_corrupted: self.corrupted.load(Ordering::Relaxed),
            frames_delayed: self.delayed.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_injected: self.injected.load(Ordering::Relaxed),
            frames_discarded: self.discarded.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    /// Frames accepted by `send`.
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Frames dropped by simulated loss.
    pub frames_dropped: u64,
    pub frames_corrupted: u64,
    /// Frames handed to the scheduler with a non-zero delay.
    pub frames_delayed: u64,
    /// Frames enqueued on an open input channel (pipeline and injected).
    pub frames_delivered: u64,
    pub frames_injected: u64,
    /// Frames with no open channel at delivery time.
    pub frames_discarded: u64,
    /// Sends refused: oversize, unsupported destination, no output channel.
    pub frames_rejected: u64,
}

impl TransportStatsSnapshot {
    /// Fraction of sent frames lost to simulated loss.
    pub fn loss_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / self.frames_sent as f64
        }
    }
}
