//! # ddsim-transport
//!
//! Deterministic network-fault-injection transport for in-process pub/sub
//! simulation.
//!
//! Stands in for a UDP/TCP transport: serialized wire frames are delivered
//! between local endpoints while loss, corruption, delay, bandwidth limits
//! and congestion are simulated from a seeded random source. A capture
//! subsystem records frames seen on the wire, and a fixed-point time type
//! backs both protocol timestamps and the simulation clock.
//!
//! ## Crate structure
//!
//! - [`time`] — Seconds + fractional-second fixed-point time
//! - [`clock`] — Explicitly advanced simulation clock
//! - [`locator`] — Endpoint identifiers
//! - [`frame`] — Frames in transit
//! - [`descriptor`] — Transport configuration (tagged by transport kind)
//! - [`fault`] — Loss / corruption / delay decisions
//! - [`scheduler`] — Timer-based delayed delivery
//! - [`channel`] — Per-locator receive loops
//! - [`capture`] — Bounded capture log and polling monitor
//! - [`context`] — Clock + capture bundle shared by transports
//! - [`transport`] — Transport contract and the simulated implementation
//! - [`stats`] — Transport counters
//! - [`error`] — Configuration and channel errors

pub mod capture;
pub mod channel;
pub mod clock;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod fault;
pub mod frame;
pub mod locator;
pub mod scheduler;
pub mod stats;
pub mod time;
pub mod transport;

pub use capture::{CaptureRecord, CaptureSummary, MessageCaptureLog};
pub use clock::SimulationClock;
pub use context::SimulationContext;
pub use descriptor::{SimulatedDescriptor, TransportDescriptor};
pub use error::{ChannelError, ConfigError};
pub use frame::Frame;
pub use locator::{Locator, LocatorKind};
pub use time::FixedPointTime;
pub use transport::{SimulatedTransport, Transport, TransportReceiver};
