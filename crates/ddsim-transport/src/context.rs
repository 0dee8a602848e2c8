//! # Simulation Context
//!
//! Bundles the clock, the capture log, the last-observed-frame slot and the
//! optional monitor. Transports hold an `Arc` to one; tests construct their
//! own so runs never share state. [`SimulationContext::global`] provides a
//! process-wide instance for wiring that needs ambient access.

use std::sync::{Arc, Mutex, OnceLock};

use tracing::{info, warn};

use crate::capture::{
    CaptureMonitor, CaptureSummary, FrameSlot, MessageCaptureLog, DEFAULT_CAPTURE_CAPACITY,
};
use crate::clock::SimulationClock;
use crate::frame::Frame;

static GLOBAL: OnceLock<Arc<SimulationContext>> = OnceLock::new();

pub struct SimulationContext {
    clock: Arc<SimulationClock>,
    captures: Arc<MessageCaptureLog>,
    slot: Arc<FrameSlot>,
    monitor: Mutex<Option<CaptureMonitor>>,
}

impl SimulationContext {
    pub fn new() -> Self {
        Self::with_capture_capacity(DEFAULT_CAPTURE_CAPACITY)
    }

    pub fn with_capture_capacity(capacity: usize) -> Self {
        let clock = Arc::new(SimulationClock::new());
        SimulationContext {
            captures: Arc::new(MessageCaptureLog::with_clock(capacity, clock.clone())),
            clock,
            slot: Arc::new(FrameSlot::new()),
            monitor: Mutex::new(None),
        }
    }

    /// Shared process-wide context.
    pub fn global() -> Arc<SimulationContext> {
        GLOBAL
            .get_or_init(|| Arc::new(SimulationContext::new()))
            .clone()
    }

    pub fn clock(&self) -> &Arc<SimulationClock> {
        &self.clock
    }

    pub fn captures(&self) -> &Arc<MessageCaptureLog> {
        &self.captures
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Publish `frame` as the last observed frame.
    pub fn observe(&self, frame: &Frame) {
        self.slot.store(frame.clone());
    }

    /// Clear the capture log and start the monitor. `false` if a monitor is
    /// already running or its thread could not be started.
    pub fn start_monitoring(&self) -> bool {
        let mut monitor = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if monitor.as_ref().is_some_and(|m| m.is_running()) {
            return false;
        }
        self.captures.clear();
        match CaptureMonitor::start(self.slot.clone(), self.captures.clone()) {
            Ok(m) => {
                *monitor = Some(m);
                info!("message capture monitoring started");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to start capture monitor");
                false
            }
        }
    }

    /// Stop the monitor and summarise what was captured. `None` if no
    /// monitor was started.
    pub fn stop_monitoring(&self) -> Option<CaptureSummary> {
        let taken = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let mut monitor = taken?;
        monitor.stop();

        let summary = self.captures.summary();
        info!(
            total_captured = summary.total_captured,
            total_bytes = summary.total_bytes,
            protocol_frames = summary.protocol_frames,
            evicted = summary.evicted,
            "message capture monitoring stopped"
        );
        for (destination, count) in &summary.per_destination {
            info!(%destination, count, "captured frames per destination");
        }
        Some(summary)
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|m| m.is_running())
    }
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new()
    }
}
