//! # Delivery Scheduler
//!
//! Simulated delay never sleeps on the sender's thread. Every frame that
//! survives the fault pipeline is handed to one timer thread, which keeps a
//! min-heap ordered by `(due, sequence)` and pushes each frame into its
//! destination channel when it falls due.
//!
//! Due instants are kept monotonic per destination, so jitter can stretch
//! gaps between frames but never reorders a channel. The scheduler also
//! tracks how many bytes are in flight per destination; the fault pipeline
//! reads that as queue occupancy for congestion.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use quanta::Instant;
use tracing::{debug, warn};

use crate::channel::ChannelTable;
use crate::frame::Frame;
use crate::locator::Locator;
use crate::stats::TransportStats;

/// Longest idle wait before the timer thread re-checks its queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Horizon used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Scheduled {
    due: Instant,
    seq: u64,
    destination: Locator,
    frame: Frame,
}

// BinaryHeap is a max-heap; reverse so the earliest (due, seq) pops first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

enum SchedulerMessage {
    Schedule(Scheduled),
    Shutdown,
}

#[derive(Debug, Default)]
struct Lane {
    last_due: Option<Instant>,
    in_flight_bytes: u64,
}

type Lanes = Arc<Mutex<HashMap<Locator, Lane>>>;

// ─── DeliveryScheduler ──────────────────────────────────────────────────────

pub struct DeliveryScheduler {
    sender: Sender<SchedulerMessage>,
    lanes: Lanes,
    next_seq: AtomicU64,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DeliveryScheduler {
    /// Start the timer thread delivering into `channels`.
    pub fn start(
        channels: Arc<ChannelTable>,
        stats: Arc<TransportStats>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let lanes: Lanes = Arc::new(Mutex::new(HashMap::new()));
        let worker_lanes = lanes.clone();

        let handle = thread::Builder::new()
            .name("ddsim-delivery".into())
            .spawn(move || scheduler_worker(rx, channels, worker_lanes, stats))?;
        debug!("delivery scheduler started");

        Ok(DeliveryScheduler {
            sender: tx,
            lanes,
            next_seq: AtomicU64::new(0),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Deliver `frame` to `destination` after `delay`, but never before a
    /// frame previously scheduled for the same destination. Returns `false`
    /// if the scheduler has shut down.
    pub fn schedule(&self, destination: Locator, frame: Frame, delay: Duration) -> bool {
        let now = Instant::now();
        let requested = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let len = frame.len() as u64;
        let due = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            let lane = lanes.entry(destination).or_default();
            let due = match lane.last_due {
                Some(last) if last > requested => last,
                _ => requested,
            };
            lane.last_due = Some(due);
            lane.in_flight_bytes += len;
            due
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let msg = SchedulerMessage::Schedule(Scheduled {
            due,
            seq,
            destination,
            frame,
        });
        if self.sender.send(msg).is_err() {
            release(&self.lanes, &destination, len);
            return false;
        }
        true
    }

    /// Bytes scheduled for `destination` but not yet delivered.
    pub fn occupancy(&self, destination: &Locator) -> u64 {
        self.lanes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(destination)
            .map(|l| l.in_flight_bytes)
            .unwrap_or(0)
    }

    /// Stop the timer thread. Frames still pending are discarded.
    pub fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = self.sender.send(SchedulerMessage::Shutdown);
            if handle.join().is_err() {
                warn!("delivery thread panicked");
            }
            debug!("delivery scheduler stopped");
        }
    }
}

impl Drop for DeliveryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn release(lanes: &Lanes, destination: &Locator, len: u64) {
    let mut lanes = lanes.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(lane) = lanes.get_mut(destination) {
        lane.in_flight_bytes = lane.in_flight_bytes.saturating_sub(len);
    }
}

fn scheduler_worker(
    rx: Receiver<SchedulerMessage>,
    channels: Arc<ChannelTable>,
    lanes: Lanes,
    stats: Arc<TransportStats>,
) {
    let mut pending: BinaryHeap<Scheduled> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while pending.peek().is_some_and(|next| next.due <= now) {
            let Some(next) = pending.pop() else { break };
            release(&lanes, &next.destination, next.frame.len() as u64);
            if channels.route(&next.destination, next.frame) {
                stats.record_delivered();
            } else {
                stats.record_discarded();
                debug!(destination = %next.destination, "no open channel; frame discarded");
            }
        }

        let wait = pending
            .peek()
            .map(|next| next.due.saturating_duration_since(now))
            .unwrap_or(IDLE_POLL_INTERVAL)
            .min(IDLE_POLL_INTERVAL);

        match rx.recv_timeout(wait) {
            Ok(SchedulerMessage::Schedule(item)) => pending.push(item),
            Ok(SchedulerMessage::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Frames that raced in behind the shutdown sentinel.
    for msg in rx.try_iter() {
        if let SchedulerMessage::Schedule(item) = msg {
            pending.push(item);
        }
    }
    if !pending.is_empty() {
        debug!(pending = pending.len(), "discarding scheduled frames at shutdown");
    }
    for item in pending.drain() {
        release(&lanes, &item.destination, item.frame.len() as u64);
        stats.record_discarded();
    }
}
