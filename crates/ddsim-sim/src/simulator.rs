//! # HelloWorld Simulator
//!
//! Publisher and subscriber sharing one simulated transport:
//!
//! 1. open the subscriber's input channel and the publisher's output channel
//! 2. optionally start the capture monitor
//! 3. publish `samples` HelloWorld samples, advancing the simulation clock by
//!    the interval after each one
//! 4. wait (bounded) until every published sample is accounted for:
//!    received, undecodable, dropped or discarded
//! 5. inject one extra sample (index 999) at the subscriber endpoint and wait
//!    for it to arrive
//! 6. stop monitoring and report

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use ddsim_transport::capture::CaptureSummary;
use ddsim_transport::stats::TransportStatsSnapshot;
use ddsim_transport::{
    FixedPointTime, Locator, SimulatedDescriptor, SimulatedTransport, SimulationContext,
    Transport, TransportReceiver,
};

use crate::hello::{guid_prefix, HelloWorld};

/// Index carried by the injected sample.
pub const INJECTED_INDEX: u32 = 999;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub samples: u32,
    /// Gap between samples, both on the wall clock and on the simulation
    /// clock.
    pub interval: Duration,
    pub message: String,
    pub subscriber_endpoint: Locator,
    /// Longest wait for the subscriber after the last publish.
    pub receive_timeout: Duration,
    /// Longest wait for the injected sample.
    pub injection_timeout: Duration,
    pub monitor: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            interval: Duration::from_millis(100),
            message: "HelloWorld".to_string(),
            subscriber_endpoint: Locator::udp_v4([127, 0, 0, 1], 7412),
            receive_timeout: Duration::from_secs(5),
            injection_timeout: Duration::from_secs(5),
            monitor: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub published: u32,
    pub received: u32,
    pub undecodable: u32,
    pub last_index: Option<u32>,
    pub injected_received: bool,
    pub simulated_time: FixedPointTime,
    pub transport: TransportStatsSnapshot,
    pub captures: Option<CaptureSummary>,
}

// ─── Subscriber ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct SubscriberListener {
    received: AtomicU32,
    undecodable: AtomicU32,
    injected: AtomicBool,
    last_index: Mutex<Option<u32>>,
}

impl TransportReceiver for SubscriberListener {
    fn on_data_received(&self, data: &[u8], _local: &Locator, remote: &Locator) {
        match HelloWorld::decode(data) {
            Ok(sample) if sample.index == INJECTED_INDEX => {
                info!(index = sample.index, message = %sample.message, "injected sample received");
                self.injected.store(true, Ordering::Release);
            }
            Ok(sample) => {
                let n = self.received.fetch_add(1, Ordering::AcqRel) + 1;
                *self.last_index.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample.index);
                debug!(n, index = sample.index, %remote, "sample received");
            }
            Err(e) => {
                self.undecodable.fetch_add(1, Ordering::AcqRel);
                debug!(error = %e, len = data.len(), "undecodable frame");
            }
        }
    }
}

// ─── Simulator ──────────────────────────────────────────────────────────────

pub struct HelloWorldSimulator {
    config: SimulatorConfig,
    transport: SimulatedTransport,
    guid_prefix: [u8; 12],
}

impl HelloWorldSimulator {
    pub fn new(config: SimulatorConfig, descriptor: SimulatedDescriptor) -> anyhow::Result<Self> {
        let context = Arc::new(SimulationContext::with_capture_capacity(
            descriptor.capture_capacity,
        ));
        let prefix = guid_prefix(descriptor.host_id, descriptor.transport_id);
        let transport = SimulatedTransport::new(descriptor, context)?;
        Ok(HelloWorldSimulator {
            config,
            transport,
            guid_prefix: prefix,
        })
    }

    pub fn transport(&self) -> &SimulatedTransport {
        &self.transport
    }

    pub fn run(&self) -> anyhow::Result<RunReport> {
        let endpoint = self.config.subscriber_endpoint;
        let listener = Arc::new(SubscriberListener::default());
        let max_size = self.transport.descriptor().max_message_size;

        self.transport
            .open_input_channel(&endpoint, listener.clone(), max_size)?;
        self.transport.open_output_channel(&endpoint)?;
        if self.config.monitor && !self.transport.start_monitoring() {
            warn!("capture monitor already running");
        }

        info!(
            samples = self.config.samples,
            interval_ms = self.config.interval.as_millis() as u64,
            %endpoint,
            "simulation starting"
        );

        // ── Publish ─────────────────────────────────────────────────
        let clock = self.transport.context().clock().clone();
        let mut published = 0u32;
        for index in 1..=self.config.samples {
            let data = HelloWorld::new(index, self.config.message.as_str()).encode(&self.guid_prefix);
            if self.transport.send(&data, &endpoint) {
                published += 1;
                debug!(index, size = data.len(), at = %clock.now(), "sample published");
            } else {
                warn!(index, "sample refused by transport");
            }
            clock.advance_by(self.config.interval);
            if index < self.config.samples && !self.config.interval.is_zero() {
                thread::sleep(self.config.interval);
            }
        }

        // ── Wait for the subscriber ─────────────────────────────────
        let accounted = || {
            let stats = self.transport.stats();
            listener.received.load(Ordering::Acquire) as u64
                + listener.undecodable.load(Ordering::Acquire) as u64
                + stats.frames_dropped
                + stats.frames_discarded
        };
        if !wait_until(self.config.receive_timeout, || accounted() >= published as u64) {
            warn!(
                published,
                accounted = accounted(),
                "subscriber did not account for every sample before the deadline"
            );
        }

        // ── Injection check ─────────────────────────────────────────
        let injected = HelloWorld::new(INJECTED_INDEX, "injected sample").encode(&self.guid_prefix);
        if !self.transport.inject(&injected, &endpoint.endpoint()) {
            warn!(%endpoint, "injected sample was not accepted");
        }
        let injected_received = wait_until(self.config.injection_timeout, || {
            listener.injected.load(Ordering::Acquire)
        });

        let captures = if self.config.monitor {
            self.transport.stop_monitoring()
        } else {
            None
        };
        self.transport.close_input_channel(&endpoint)?;

        let report = RunReport {
            published,
            received: listener.received.load(Ordering::Acquire),
            undecodable: listener.undecodable.load(Ordering::Acquire),
            last_index: *listener.last_index.lock().unwrap_or_else(|e| e.into_inner()),
            injected_received,
            simulated_time: clock.now(),
            transport: self.transport.stats(),
            captures,
        };
        info!(
            published = report.published,
            received = report.received,
            undecodable = report.undecodable,
            injected_received = report.injected_received,
            "simulation finished"
        );
        Ok(report)
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
