//! # Input Channels
//!
//! One [`ChannelResource`] per open input locator. Each owns a receive
//! thread that waits on its frame queue and hands every frame to the
//! registered [`TransportReceiver`].
//!
//! ```text
//!   Created ──open──▶ Listening ──close──▶ Draining ──join──▶ Closed
//! ```
//!
//! The wait is a `recv_timeout` poll that also accepts an explicit
//! `Shutdown` sentinel, so closing never depends on new data arriving.
//! Frames still queued when a channel closes are discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::frame::Frame;
use crate::locator::Locator;
use crate::transport::TransportReceiver;

/// Upper bound on how long a receive loop waits before re-checking its
/// running flag.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Listening,
    Draining,
    Closed,
}

enum ChannelMessage {
    Frame(Frame),
    Shutdown,
}

// ─── ChannelResource ────────────────────────────────────────────────────────

pub struct ChannelResource {
    locator: Locator,
    sender: Sender<ChannelMessage>,
    running: Arc<AtomicBool>,
    state: ChannelState,
    handle: Option<thread::JoinHandle<()>>,
}

impl ChannelResource {
    /// Open an input channel on `locator` and start its receive loop.
    ///
    /// Frames longer than `max_message_size` are truncated to it. The remote
    /// locator reported to the receiver is parsed from the frame's
    /// destination, falling back to `default_remote`.
    pub fn open(
        locator: Locator,
        receiver: Arc<dyn TransportReceiver>,
        max_message_size: usize,
        default_remote: Locator,
    ) -> Result<Self, ChannelError> {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let mut resource = ChannelResource {
            locator,
            sender: tx,
            running: running.clone(),
            state: ChannelState::Created,
            handle: None,
        };

        let handle = thread::Builder::new()
            .name(format!("ddsim-rcv-{}", locator.port))
            .spawn(move || {
                receive_loop(
                    locator,
                    rx,
                    running,
                    receiver,
                    max_message_size,
                    default_remote,
                )
            })?;
        resource.handle = Some(handle);
        resource.state = ChannelState::Listening;
        debug!(%locator, max_message_size, "input channel open");
        Ok(resource)
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Queue a frame for the receive loop. `false` once the channel is
    /// draining or closed.
    pub fn enqueue(&self, frame: Frame) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(ChannelMessage::Frame(frame)).is_ok()
    }

    /// Stop the receive loop and wait for it to exit.
    ///
    /// When called from the receive thread itself (a receiver closing its
    /// own channel) the loop is told to stop but not joined.
    pub fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.state = ChannelState::Draining;
        self.running.store(false, Ordering::Release);
        let _ = self.sender.send(ChannelMessage::Shutdown);

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                debug!(locator = %self.locator, "channel closed from its own receive thread");
            } else if handle.join().is_err() {
                warn!(locator = %self.locator, "receive thread panicked");
            }
        }
        self.state = ChannelState::Closed;
        debug!(locator = %self.locator, "input channel closed");
    }
}

impl Drop for ChannelResource {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(
    locator: Locator,
    rx: Receiver<ChannelMessage>,
    running: Arc<AtomicBool>,
    receiver: Arc<dyn TransportReceiver>,
    max_message_size: usize,
    default_remote: Locator,
) {
    let mut buffer = BytesMut::with_capacity(max_message_size);

    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(RECEIVE_POLL_INTERVAL) {
            Ok(ChannelMessage::Frame(frame)) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                let len = frame.data.len().min(max_message_size);
                buffer.clear();
                buffer.extend_from_slice(&frame.data[..len]);
                let remote = Locator::parse_endpoint(&frame.destination).unwrap_or(default_remote);
                receiver.on_data_received(&buffer, &locator, &remote);
            }
            Ok(ChannelMessage::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let pending = rx.try_iter().filter(|m| matches!(m, ChannelMessage::Frame(_))).count();
    if pending > 0 {
        debug!(%locator, pending, "discarding frames queued on closed channel");
    }
}

// ─── ChannelTable ───────────────────────────────────────────────────────────

/// Open input channels keyed by locator.
///
/// The lock covers only insert/remove/lookup; closing joins the receive
/// thread after the entry has been removed and the lock released.
#[derive(Default)]
pub struct ChannelTable {
    channels: Mutex<HashMap<Locator, ChannelResource>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &self,
        locator: Locator,
        receiver: Arc<dyn TransportReceiver>,
        max_message_size: usize,
        default_remote: Locator,
    ) -> Result<(), ChannelError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels.contains_key(&locator) {
            return Err(ChannelError::AlreadyOpen(locator));
        }
        let resource = ChannelResource::open(locator, receiver, max_message_size, default_remote)?;
        channels.insert(locator, resource);
        Ok(())
    }

    pub fn close(&self, locator: &Locator) -> Result<(), ChannelError> {
        let removed = self
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(locator);
        match removed {
            Some(mut resource) => {
                resource.close();
                Ok(())
            }
            None => Err(ChannelError::NotOpen(*locator)),
        }
    }

    /// Close every channel. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let drained: Vec<ChannelResource> = self
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, resource)| resource)
            .collect();
        let count = drained.len();
        for mut resource in drained {
            resource.close();
        }
        count
    }

    pub fn is_open(&self, locator: &Locator) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(locator)
    }

    pub fn len(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `frame` to the channel for `destination`: an exact locator match
    /// first, otherwise any channel with the same kind and port. `false` if
    /// no open channel takes it.
    pub fn route(&self, destination: &Locator, frame: Frame) -> bool {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let target = channels
            .get(destination)
            .or_else(|| channels.values().find(|c| c.locator().matches(destination)));
        match target {
            Some(channel) => channel.enqueue(frame),
            None => false,
        }
    }
}
