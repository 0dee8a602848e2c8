//! # Transport
//!
//! The transport contract the middleware consumes, and the simulated
//! implementation that runs it in-process.
//!
//! ## Send path
//!
//! ```text
//!   send(bytes, locator)
//!     │  reject: shut down / no output channel / disallowed / oversize
//!     ├─▶ last-observed-frame slot (and capture log if enabled)
//!     ├─▶ FaultInjectionPipeline ──▶ Drop (counted)
//!     └─▶ DeliveryScheduler ──(due)──▶ ChannelTable ──▶ receive loop ──▶ receiver
//! ```
//!
//! Sends are fire-and-forget: a simulated loss still returns `true`.
//! `inject` skips the pipeline and scheduler and queues straight into the
//! addressed channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::capture::{CaptureRecord, CaptureSummary};
use crate::channel::ChannelTable;
use crate::context::SimulationContext;
use crate::descriptor::SimulatedDescriptor;
use crate::error::{ChannelError, ConfigError};
use crate::fault::{FaultDecision, FaultInjectionPipeline};
use crate::frame::Frame;
use crate::locator::{Locator, LocatorKind, DEFAULT_REMOTE_ENDPOINT};
use crate::scheduler::DeliveryScheduler;
use crate::stats::{TransportStats, TransportStatsSnapshot};

// ─── Contract ───────────────────────────────────────────────────────────────

/// Receives frames delivered on an input channel. Called from the channel's
/// receive thread.
pub trait TransportReceiver: Send + Sync {
    fn on_data_received(&self, data: &[u8], local: &Locator, remote: &Locator);
}

pub trait Transport: Send + Sync {
    fn is_locator_supported(&self, locator: &Locator) -> bool;

    fn is_locator_allowed(&self, locator: &Locator) -> bool;

    fn is_input_channel_open(&self, locator: &Locator) -> bool;

    fn locators_match(&self, a: &Locator, b: &Locator) -> bool {
        a.matches(b)
    }

    fn open_output_channel(&self, locator: &Locator) -> Result<(), ChannelError>;

    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn TransportReceiver>,
        max_message_size: u32,
    ) -> Result<(), ChannelError>;

    fn close_input_channel(&self, locator: &Locator) -> Result<(), ChannelError>;

    /// Best-effort send. `false` only if the frame was refused outright.
    fn send(&self, data: &[u8], destination: &Locator) -> bool;

    fn shutdown(&self);
}

// ─── SimulatedTransport ─────────────────────────────────────────────────────

pub struct SimulatedTransport {
    context: Arc<SimulationContext>,
    pipeline: Mutex<FaultInjectionPipeline>,
    channels: Arc<ChannelTable>,
    scheduler: DeliveryScheduler,
    /// Output channels and when each was opened (for discovery delay).
    outputs: Mutex<HashMap<Locator, Instant>>,
    stats: Arc<TransportStats>,
    shut_down: AtomicBool,
}

impl SimulatedTransport {
    /// Validate `descriptor` and start the transport. The descriptor is
    /// owned from here on; the capture log in `context` adopts its
    /// `capture_capacity`.
    pub fn new(
        descriptor: SimulatedDescriptor,
        context: Arc<SimulationContext>,
    ) -> Result<Self, ConfigError> {
        descriptor.validate()?;
        context.captures().set_capacity(descriptor.capture_capacity);

        let channels = Arc::new(ChannelTable::new());
        let stats = Arc::new(TransportStats::new());
        let scheduler = DeliveryScheduler::start(channels.clone(), stats.clone())?;

        info!(
            loss = descriptor.packet_loss_rate,
            corruption = descriptor.packet_corruption_rate,
            delay_ms = descriptor.network_delay_ms,
            jitter_ms = descriptor.delay_jitter_ms,
            bandwidth_bps = descriptor.bandwidth_limit_bps,
            seed = descriptor.seed,
            "simulated transport created"
        );

        Ok(SimulatedTransport {
            context,
            pipeline: Mutex::new(FaultInjectionPipeline::new(descriptor)),
            channels,
            scheduler,
            outputs: Mutex::new(HashMap::new()),
            stats,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Replace the fault parameters. Only allowed before any channel is
    /// opened; the random source is reseeded from the new descriptor.
    pub fn configure(&self, descriptor: SimulatedDescriptor) -> Result<(), ConfigError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ConfigError::ShutDown);
        }
        if let Err(e) = descriptor.validate() {
            warn!(error = %e, "configuration rejected");
            return Err(e);
        }
        let outputs_open = !self
            .outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty();
        if outputs_open || !self.channels.is_empty() {
            warn!("configuration rejected: channels already open");
            return Err(ConfigError::ChannelsOpen);
        }

        self.context
            .captures()
            .set_capacity(descriptor.capture_capacity);
        *self.pipeline.lock().unwrap_or_else(|e| e.into_inner()) =
            FaultInjectionPipeline::new(descriptor);
        debug!("fault parameters reconfigured");
        Ok(())
    }

    /// Copy of the installed descriptor.
    pub fn descriptor(&self) -> SimulatedDescriptor {
        self.pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .descriptor()
            .clone()
    }

    pub fn context(&self) -> &Arc<SimulationContext> {
        &self.context
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    fn default_remote(&self) -> Locator {
        self.pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .descriptor()
            .default_remote()
            .or_else(|| Locator::parse_endpoint(DEFAULT_REMOTE_ENDPOINT))
            .unwrap_or_else(|| Locator::udp_v4([127, 0, 0, 1], 7412))
    }

    /// Push a synthetic frame into the receive path of `destination`
    /// (`"address:port"`, falling back to the default remote endpoint).
    ///
    /// The frame also becomes the last observed frame, so the monitor sees
    /// it exactly as it sees sent frames. Returns `true` if an open input
    /// channel accepted it; empty data is refused.
    pub fn inject(&self, data: &[u8], destination: &str) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        if data.is_empty() {
            warn!(%destination, "refusing to inject empty frame");
            return false;
        }
        let frame = Frame::new(Bytes::copy_from_slice(data), destination);
        self.context.observe(&frame);
        self.stats.record_injected();

        let locator =
            Locator::parse_endpoint(destination).unwrap_or_else(|| self.default_remote());
        if self.channels.route(&locator, frame) {
            self.stats.record_delivered();
            debug!(%locator, len = data.len(), "frame injected");
            true
        } else {
            self.stats.record_discarded();
            debug!(%locator, "injected frame has no open channel");
            false
        }
    }

    pub fn start_monitoring(&self) -> bool {
        self.context.start_monitoring()
    }

    pub fn stop_monitoring(&self) -> Option<CaptureSummary> {
        self.context.stop_monitoring()
    }

    pub fn capture_count(&self) -> usize {
        self.context.captures().capture_count()
    }

    pub fn capture_at(&self, index: usize) -> Option<CaptureRecord> {
        self.context.captures().capture_at(index)
    }

    pub fn all_captures(&self) -> Vec<CaptureRecord> {
        self.context.captures().all_captures()
    }

    pub fn clear_captures(&self) {
        self.context.captures().clear()
    }

    fn reject(&self, destination: &Locator, reason: &'static str) -> bool {
        self.stats.record_rejected();
        debug!(%destination, reason, "send rejected");
        false
    }
}

impl Transport for SimulatedTransport {
    fn is_locator_supported(&self, locator: &Locator) -> bool {
        matches!(
            locator.kind,
            LocatorKind::UdpV4 | LocatorKind::UdpV6 | LocatorKind::Simulated
        )
    }

    fn is_locator_allowed(&self, locator: &Locator) -> bool {
        if !self.is_locator_supported(locator) {
            return false;
        }
        let pipeline = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        let allowlist = &pipeline.descriptor().allowlist;
        allowlist.is_empty() || allowlist.contains(&locator.address)
    }

    fn is_input_channel_open(&self, locator: &Locator) -> bool {
        self.channels.is_open(locator)
    }

    fn open_output_channel(&self, locator: &Locator) -> Result<(), ChannelError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ChannelError::ShutDown);
        }
        if !self.is_locator_allowed(locator) {
            return Err(ChannelError::Unsupported(*locator));
        }
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(*locator)
            .or_insert_with(|| {
                debug!(%locator, "output channel open");
                Instant::now()
            });
        Ok(())
    }

    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn TransportReceiver>,
        max_message_size: u32,
    ) -> Result<(), ChannelError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ChannelError::ShutDown);
        }
        if !self.is_locator_allowed(locator) {
            return Err(ChannelError::Unsupported(*locator));
        }
        let limit = self
            .pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .descriptor()
            .max_message_size;
        let max = max_message_size.min(limit) as usize;
        self.channels
            .open(*locator, receiver, max, self.default_remote())
    }

    fn close_input_channel(&self, locator: &Locator) -> Result<(), ChannelError> {
        self.channels.close(locator)
    }

    fn send(&self, data: &[u8], destination: &Locator) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return self.reject(destination, "transport shut down");
        }
        let opened_at = self
            .outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(destination)
            .copied();
        let Some(opened_at) = opened_at else {
            return self.reject(destination, "output channel not open");
        };
        if !self.is_locator_allowed(destination) {
            return self.reject(destination, "locator not allowed");
        }

        // Held across the decision and scheduling so concurrent senders
        // enter the scheduler in decision order.
        let mut pipeline = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        let desc = pipeline.descriptor();
        if data.len() > desc.max_message_size as usize {
            drop(pipeline);
            return self.reject(destination, "frame exceeds max_message_size");
        }
        let capture_directly = desc.enable_packet_capture;
        let discovery = Duration::from_millis(desc.discovery_delay_ms as u64);

        let frame = Frame::new(Bytes::copy_from_slice(data), destination.endpoint());
        self.stats.record_sent(data.len());
        self.context.observe(&frame);
        if capture_directly {
            self.context.captures().capture(&frame);
        }

        let occupancy = self.scheduler.occupancy(destination);
        match pipeline.process(frame, occupancy) {
            FaultDecision::Drop => {
                self.stats.record_dropped();
                debug!(%destination, len = data.len(), "frame dropped");
            }
            FaultDecision::Deliver {
                frame,
                delay,
                corrupted,
            } => {
                if corrupted {
                    self.stats.record_corrupted();
                }
                let held = discovery.saturating_sub(Instant::now().saturating_duration_since(opened_at));
                let delay = delay.max(held);
                if !delay.is_zero() {
                    self.stats.record_delayed();
                }
                if !self.scheduler.schedule(*destination, frame, delay) {
                    self.stats.record_discarded();
                }
            }
        }
        true
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let closed = self.channels.close_all();
        self.scheduler.shutdown();
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        let stats = self.stats.snapshot();
        info!(
            channels_closed = closed,
            sent = stats.frames_sent,
            dropped = stats.frames_dropped,
            delivered = stats.frames_delivered,
            "simulated transport shut down"
        );
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
