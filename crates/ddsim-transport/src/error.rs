//! # Errors
//!
//! Configuration errors are raised synchronously when a descriptor is
//! validated or installed. Channel errors are returned to the caller of the
//! channel operation and leave the channel table unchanged.
//!
//! Frame drops are not errors: they are an expected fault-injection outcome
//! and only show up in [`crate::stats::TransportStats`].

use crate::locator::Locator;
use thiserror::Error;

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot reconfigure while channels are open")]
    ChannelsOpen,
    #[error("transport is shut down")]
    ShutDown,
    #[error("failed to spawn delivery thread: {0}")]
    Spawn(#[from] std::io::Error),
}

// ── Channels ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("input channel already open on {0}")]
    AlreadyOpen(Locator),
    #[error("no input channel open on {0}")]
    NotOpen(Locator),
    #[error("locator {0} is not supported or not allowed")]
    Unsupported(Locator),
    #[error("transport is shut down")]
    ShutDown,
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[from] std::io::Error),
}
