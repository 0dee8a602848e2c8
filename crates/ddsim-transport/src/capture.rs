//! # Message Capture
//!
//! Bounded history of frames seen on the wire, plus the polling monitor that
//! fills it from the last-observed-frame slot.
//!
//! The slot is a test seam: the send path and `inject` both overwrite it, and
//! the monitor records each distinct value it sees. Bursts faster than the
//! poll interval can be missed; callers that need every frame should call
//! [`MessageCaptureLog::capture`] directly (the transport does so when
//! `enable_packet_capture` is set).

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::SimulationClock;
use crate::frame::Frame;
use crate::time::FixedPointTime;

pub const DEFAULT_CAPTURE_CAPACITY: usize = 1000;
/// How often the monitor looks at the slot.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub data: Bytes,
    pub destination: String,
    /// Position in capture order since the last clear.
    pub sequence: u64,
    /// Simulation clock reading when captured.
    pub captured_at: FixedPointTime,
}

impl CaptureRecord {
    pub fn has_protocol_magic(&self) -> bool {
        crate::frame::has_protocol_magic(&self.data)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub total_captured: usize,
    pub total_bytes: u64,
    pub per_destination: BTreeMap<String, usize>,
    /// Records starting with the wire-protocol magic.
    pub protocol_frames: usize,
    /// Records pushed out by the capacity bound.
    pub evicted: u64,
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "captured {} frames, {} bytes, {} RTPS, {} evicted",
            self.total_captured, self.total_bytes, self.protocol_frames, self.evicted
        )?;
        for (destination, count) in &self.per_destination {
            writeln!(f, "  {destination}: {count}")?;
        }
        Ok(())
    }
}

// ─── MessageCaptureLog ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LogInner {
    records: VecDeque<CaptureRecord>,
    next_sequence: u64,
    evicted: u64,
}

/// FIFO history bounded by `capacity`; the oldest record is evicted first.
#[derive(Debug)]
pub struct MessageCaptureLog {
    inner: Mutex<LogInner>,
    capacity: Mutex<usize>,
    clock: Option<Arc<SimulationClock>>,
}

impl MessageCaptureLog {
    pub fn new(capacity: usize) -> Self {
        MessageCaptureLog {
            inner: Mutex::new(LogInner::default()),
            capacity: Mutex::new(capacity.max(1)),
            clock: None,
        }
    }

    /// Stamp records with readings of `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<SimulationClock>) -> Self {
        MessageCaptureLog {
            clock: Some(clock),
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        *self.capacity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Change the bound, evicting the oldest records if over it.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        *self.capacity.lock().unwrap_or_else(|e| e.into_inner()) = capacity;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.records.len() > capacity {
            inner.records.pop_front();
            inner.evicted += 1;
        }
    }

    /// Append a record for `frame`. Returns its sequence number.
    pub fn capture(&self, frame: &Frame) -> u64 {
        let captured_at = self
            .clock
            .as_ref()
            .map(|c| c.now())
            .unwrap_or(FixedPointTime::ZERO);
        let capacity = self.capacity();

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        while inner.records.len() >= capacity {
            inner.records.pop_front();
            inner.evicted += 1;
        }
        inner.records.push_back(CaptureRecord {
            data: frame.data.clone(),
            destination: frame.destination.clone(),
            sequence,
            captured_at,
        });
        sequence
    }

    pub fn capture_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .len()
    }

    /// Record at `index`, oldest first.
    pub fn capture_at(&self, index: usize) -> Option<CaptureRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .get(index)
            .cloned()
    }

    pub fn all_captures(&self) -> Vec<CaptureRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = LogInner::default();
    }

    pub fn summary(&self) -> CaptureSummary {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = CaptureSummary {
            total_captured: inner.records.len(),
            evicted: inner.evicted,
            ..Default::default()
        };
        for record in &inner.records {
            summary.total_bytes += record.data.len() as u64;
            *summary
                .per_destination
                .entry(record.destination.clone())
                .or_insert(0) += 1;
            if record.has_protocol_magic() {
                summary.protocol_frames += 1;
            }
        }
        summary
    }
}

impl Default for MessageCaptureLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_CAPACITY)
    }
}

// ─── Frame slot ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("frame slot lock poisoned")]
pub struct SlotPoisoned;

/// The single "last observed frame" cell shared by the send path, `inject`
/// and the monitor.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    pub fn snapshot(&self) -> Result<Option<Frame>, SlotPoisoned> {
        self.frame
            .lock()
            .map(|f| f.clone())
            .map_err(|_| SlotPoisoned)
    }
}

// ─── Monitor ────────────────────────────────────────────────────────────────

/// Background poller copying distinct slot values into the log.
pub struct CaptureMonitor {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureMonitor {
    pub fn start(slot: Arc<FrameSlot>, log: Arc<MessageCaptureLog>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("ddsim-capture".into())
            .spawn(move || monitor_loop(slot, log, flag))?;
        Ok(CaptureMonitor {
            running,
            handle: Some(handle),
        })
    }

    /// `false` once stopped, or once the loop gave up on an error.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling. No capture happens after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("capture monitor panicked");
            }
        }
    }
}

impl Drop for CaptureMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(slot: Arc<FrameSlot>, log: Arc<MessageCaptureLog>, running: Arc<AtomicBool>) {
    let mut last_seen: Option<Frame> = None;
    debug!("capture monitor running");

    while running.load(Ordering::Acquire) {
        match slot.snapshot() {
            Ok(Some(frame)) => {
                if last_seen.as_ref() != Some(&frame) {
                    log.capture(&frame);
                    last_seen = Some(frame);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "capture monitor stopped");
                running.store(false, Ordering::Release);
                break;
            }
        }
        thread::sleep(MONITOR_POLL_INTERVAL);
    }
}
