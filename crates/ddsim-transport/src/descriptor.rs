//! # Transport Descriptors
//!
//! Value-type configuration for every transport kind the middleware knows
//! about. Only [`TransportDescriptor::Simulated`] produces a working
//! transport here; the socket kinds exist so configuration files and locator
//! queries can name them, and `Dummy` is an intentionally disabled stub.
//!
//! A transport clones its descriptor on construction, so mutating the
//! original afterwards never affects a running transport.
//!
//! Descriptors are built in code (struct literals over `Default`) or loaded
//! from TOML:
//!
//! ```toml
//! kind = "simulated"
//! packet_loss_rate = 0.1
//! packet_loss_pattern = "burst"
//! packet_loss_burst_length = 3
//! network_delay_ms = 20
//! delay_pattern = "normal"
//! delay_jitter_ms = 5
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::SimulationContext;
use crate::error::ConfigError;
use crate::locator::{Locator, DEFAULT_REMOTE_ENDPOINT};
use crate::transport::SimulatedTransport;

/// UDP payload ceiling used by the socket kinds.
pub const DEFAULT_SOCKET_MESSAGE_SIZE: u32 = 65_500;
pub const DEFAULT_MAX_INITIAL_PEERS_RANGE: u32 = 4;

// ─── Pattern enums ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossPattern {
    #[default]
    Random,
    /// A drop is followed by `packet_loss_burst_length` further drops.
    Burst,
    /// Every `round(1 / rate)`-th frame is dropped.
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPattern {
    #[default]
    BitFlip,
    ByteCorrupt,
    /// Corruption confined to the first `corruption_header_len` bytes.
    HeaderCorrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayPattern {
    #[default]
    Fixed,
    Normal,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionPattern {
    #[default]
    Gradual,
    Sudden,
}

// ─── Socket kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketDescriptor {
    pub max_message_size: u32,
    pub max_initial_peers_range: u32,
}

impl Default for SocketDescriptor {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_SOCKET_MESSAGE_SIZE,
            max_initial_peers_range: DEFAULT_MAX_INITIAL_PEERS_RANGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpDescriptor {
    pub socket: SocketDescriptor,
    pub listening_ports: Vec<u16>,
    /// Public address announced to peers (TCPv4 only).
    pub wan_addr: Option<Ipv4Addr>,
}

impl TcpDescriptor {
    pub fn add_listener_port(&mut self, port: u16) {
        if !self.listening_ports.contains(&port) {
            self.listening_ports.push(port);
        }
    }
}

// ─── Simulated kind ─────────────────────────────────────────────────────────

/// Fault-injection parameters of the simulated network.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDescriptor {
    pub max_message_size: u32,
    pub max_initial_peers_range: u32,
    pub host_id: u32,
    pub transport_id: u32,

    pub packet_loss_rate: f64,
    pub packet_loss_pattern: LossPattern,
    pub packet_loss_burst_length: u32,

    pub packet_corruption_rate: f64,
    pub corruption_pattern: CorruptionPattern,
    /// Share of the frame's bytes changed when a frame is corrupted.
    pub corruption_data_ratio: f64,
    pub corruption_header_len: usize,

    pub network_delay_ms: u32,
    pub delay_jitter_ms: u32,
    pub delay_pattern: DelayPattern,

    /// 0 disables bandwidth simulation.
    pub bandwidth_limit_bps: u64,
    pub enable_congestion: bool,
    /// Bytes in flight per destination before congestion builds up.
    pub congestion_window_size: u32,
    pub congestion_pattern: CongestionPattern,
    pub congestion_recovery_factor: f64,

    /// Frames to a destination are held this long after its output channel
    /// opens.
    pub discovery_delay_ms: u32,

    pub seed: u64,
    /// Multiplier applied to every simulated delay.
    pub time_scale_factor: f64,

    /// Capture every sent frame directly on the send path.
    pub enable_packet_capture: bool,
    /// Accepted for compatibility; nothing is written to it.
    pub packet_capture_file: String,
    pub capture_capacity: usize,

    pub default_remote_endpoint: String,
    /// Addresses a locator must match to be allowed; empty allows all.
    pub allowlist: Vec<IpAddr>,
}

impl Default for SimulatedDescriptor {
    fn default() -> Self {
        Self {
            max_message_size: 65_536,
            max_initial_peers_range: DEFAULT_MAX_INITIAL_PEERS_RANGE,
            host_id: 0,
            transport_id: 0,
            packet_loss_rate: 0.0,
            packet_loss_pattern: LossPattern::Random,
            packet_loss_burst_length: 1,
            packet_corruption_rate: 0.0,
            corruption_pattern: CorruptionPattern::BitFlip,
            corruption_data_ratio: 0.1,
            corruption_header_len: 20,
            network_delay_ms: 0,
            delay_jitter_ms: 0,
            delay_pattern: DelayPattern::Fixed,
            bandwidth_limit_bps: 0,
            enable_congestion: false,
            congestion_window_size: 65_536,
            congestion_pattern: CongestionPattern::Gradual,
            congestion_recovery_factor: 1.0,
            discovery_delay_ms: 0,
            seed: 0,
            time_scale_factor: 1.0,
            enable_packet_capture: false,
            packet_capture_file: "simulated_transport_capture.pcap".to_string(),
            capture_capacity: 1000,
            default_remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            allowlist: Vec::new(),
        }
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange { field, value })
    }
}

fn check_positive(field: &'static str, positive: bool) -> Result<(), ConfigError> {
    if positive {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field })
    }
}

impl SimulatedDescriptor {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rate("packet_loss_rate", self.packet_loss_rate)?;
        check_rate("packet_corruption_rate", self.packet_corruption_rate)?;
        check_rate("corruption_data_ratio", self.corruption_data_ratio)?;
        check_positive("max_message_size", self.max_message_size > 0)?;
        check_positive("corruption_header_len", self.corruption_header_len > 0)?;
        check_positive(
            "congestion_recovery_factor",
            self.congestion_recovery_factor > 0.0 && self.congestion_recovery_factor.is_finite(),
        )?;
        check_positive(
            "time_scale_factor",
            self.time_scale_factor > 0.0 && self.time_scale_factor.is_finite(),
        )?;
        check_positive("capture_capacity", self.capture_capacity > 0)?;
        if Locator::parse_endpoint(&self.default_remote_endpoint).is_none() {
            return Err(ConfigError::InvalidEndpoint(
                self.default_remote_endpoint.clone(),
            ));
        }
        Ok(())
    }

    /// Parsed form of `default_remote_endpoint`.
    pub fn default_remote(&self) -> Option<Locator> {
        Locator::parse_endpoint(&self.default_remote_endpoint)
    }
}

// ─── TransportDescriptor ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TransportDescriptor {
    UdpV4(SocketDescriptor),
    UdpV6(SocketDescriptor),
    TcpV4(TcpDescriptor),
    TcpV6(TcpDescriptor),
    Simulated(SimulatedDescriptor),
    /// Disabled stub: never produces a transport.
    Dummy(SocketDescriptor),
}

impl Default for TransportDescriptor {
    fn default() -> Self {
        TransportDescriptor::Simulated(SimulatedDescriptor::default())
    }
}

impl TransportDescriptor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TransportDescriptor::UdpV4(_) => "udpv4",
            TransportDescriptor::UdpV6(_) => "udpv6",
            TransportDescriptor::TcpV4(_) => "tcpv4",
            TransportDescriptor::TcpV6(_) => "tcpv6",
            TransportDescriptor::Simulated(_) => "simulated",
            TransportDescriptor::Dummy(_) => "dummy",
        }
    }

    pub fn max_message_size(&self) -> u32 {
        match self {
            TransportDescriptor::UdpV4(s)
            | TransportDescriptor::UdpV6(s)
            | TransportDescriptor::Dummy(s) => s.max_message_size,
            TransportDescriptor::TcpV4(t) | TransportDescriptor::TcpV6(t) => {
                t.socket.max_message_size
            }
            TransportDescriptor::Simulated(s) => s.max_message_size,
        }
    }

    /// Smallest send buffer the transport needs. The simulated kind never
    /// touches a socket buffer.
    pub fn min_send_buffer_size(&self) -> u32 {
        match self {
            TransportDescriptor::Simulated(_) => 0,
            other => other.max_message_size(),
        }
    }

    pub fn as_simulated(&self) -> Option<&SimulatedDescriptor> {
        match self {
            TransportDescriptor::Simulated(s) => Some(s),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            TransportDescriptor::Simulated(s) => s.validate(),
            other => check_positive("max_message_size", other.max_message_size() > 0),
        }
    }

    /// Build a transport for this descriptor.
    ///
    /// Returns `None` when the descriptor is not usable: a kind without a
    /// simulated backend, or a simulated descriptor that fails validation.
    pub fn create_transport(&self, context: Arc<SimulationContext>) -> Option<SimulatedTransport> {
        match self {
            TransportDescriptor::Simulated(desc) => match SimulatedTransport::new(desc.clone(), context) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    warn!(error = %e, "simulated descriptor rejected");
                    None
                }
            },
            other => {
                warn!(kind = other.kind_name(), "transport kind has no simulated backend");
                None
            }
        }
    }

    /// Load from TOML. An empty document yields the default simulated
    /// descriptor.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(TransportDescriptor::default());
        }
        let parsed: TransportDescriptorInput = toml::from_str(input)?;
        parsed.resolve()
    }
}

// ─── TOML input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportDescriptorInput {
    UdpV4(SocketDescriptorInput),
    UdpV6(SocketDescriptorInput),
    TcpV4(TcpDescriptorInput),
    TcpV6(TcpDescriptorInput),
    Simulated(SimulatedDescriptorInput),
    Dummy(SocketDescriptorInput),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SocketDescriptorInput {
    pub max_message_size: Option<u32>,
    pub max_initial_peers_range: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TcpDescriptorInput {
    pub max_message_size: Option<u32>,
    pub max_initial_peers_range: Option<u32>,
    pub listening_ports: Vec<u16>,
    pub wan_addr: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulatedDescriptorInput {
    pub max_message_size: Option<u32>,
    pub max_initial_peers_range: Option<u32>,
    pub host_id: Option<u32>,
    pub transport_id: Option<u32>,
    pub packet_loss_rate: Option<f64>,
    pub packet_loss_pattern: Option<LossPattern>,
    pub packet_loss_burst_length: Option<u32>,
    pub packet_corruption_rate: Option<f64>,
    pub corruption_pattern: Option<CorruptionPattern>,
    pub corruption_data_ratio: Option<f64>,
    pub corruption_header_len: Option<usize>,
    pub network_delay_ms: Option<u32>,
    pub delay_jitter_ms: Option<u32>,
    pub delay_pattern: Option<DelayPattern>,
    pub bandwidth_limit_bps: Option<u64>,
    pub enable_congestion: Option<bool>,
    pub congestion_window_size: Option<u32>,
    pub congestion_pattern: Option<CongestionPattern>,
    pub congestion_recovery_factor: Option<f64>,
    pub discovery_delay_ms: Option<u32>,
    pub seed: Option<u64>,
    pub time_scale_factor: Option<f64>,
    pub enable_packet_capture: Option<bool>,
    pub packet_capture_file: Option<String>,
    pub capture_capacity: Option<usize>,
    pub default_remote_endpoint: Option<String>,
    pub allowlist: Vec<IpAddr>,
}

impl SocketDescriptorInput {
    fn resolve(self) -> SocketDescriptor {
        let d = SocketDescriptor::default();
        SocketDescriptor {
            max_message_size: self.max_message_size.unwrap_or(d.max_message_size),
            max_initial_peers_range: self
                .max_initial_peers_range
                .unwrap_or(d.max_initial_peers_range),
        }
    }
}

impl TcpDescriptorInput {
    fn resolve(self) -> TcpDescriptor {
        let socket = SocketDescriptorInput {
            max_message_size: self.max_message_size,
            max_initial_peers_range: self.max_initial_peers_range,
        }
        .resolve();
        let mut tcp = TcpDescriptor {
            socket,
            listening_ports: Vec::new(),
            wan_addr: self.wan_addr,
        };
        for port in self.listening_ports {
            tcp.add_listener_port(port);
        }
        tcp
    }
}

impl SimulatedDescriptorInput {
    fn resolve(self) -> SimulatedDescriptor {
        let d = SimulatedDescriptor::default();
        SimulatedDescriptor {
            max_message_size: self.max_message_size.unwrap_or(d.max_message_size),
            max_initial_peers_range: self
                .max_initial_peers_range
                .unwrap_or(d.max_initial_peers_range),
            host_id: self.host_id.unwrap_or(d.host_id),
            transport_id: self.transport_id.unwrap_or(d.transport_id),
            packet_loss_rate: self.packet_loss_rate.unwrap_or(d.packet_loss_rate),
            packet_loss_pattern: self.packet_loss_pattern.unwrap_or(d.packet_loss_pattern),
            packet_loss_burst_length: self
                .packet_loss_burst_length
                .unwrap_or(d.packet_loss_burst_length),
            packet_corruption_rate: self
                .packet_corruption_rate
                .unwrap_or(d.packet_corruption_rate),
            corruption_pattern: self.corruption_pattern.unwrap_or(d.corruption_pattern),
            corruption_data_ratio: self
                .corruption_data_ratio
                .unwrap_or(d.corruption_data_ratio),
            corruption_header_len: self
                .corruption_header_len
                .unwrap_or(d.corruption_header_len),
            network_delay_ms: self.network_delay_ms.unwrap_or(d.network_delay_ms),
            delay_jitter_ms: self.delay_jitter_ms.unwrap_or(d.delay_jitter_ms),
            delay_pattern: self.delay_pattern.unwrap_or(d.delay_pattern),
            bandwidth_limit_bps: self.bandwidth_limit_bps.unwrap_or(d.bandwidth_limit_bps),
            enable_congestion: self.enable_congestion.unwrap_or(d.enable_congestion),
            congestion_window_size: self
                .congestion_window_size
                .unwrap_or(d.congestion_window_size),
            congestion_pattern: self.congestion_pattern.unwrap_or(d.congestion_pattern),
            congestion_recovery_factor: self
                .congestion_recovery_factor
                .unwrap_or(d.congestion_recovery_factor),
            discovery_delay_ms: self.discovery_delay_ms.unwrap_or(d.discovery_delay_ms),
            seed: self.seed.unwrap_or(d.seed),
            time_scale_factor: self.time_scale_factor.unwrap_or(d.time_scale_factor),
            enable_packet_capture: self
                .enable_packet_capture
                .unwrap_or(d.enable_packet_capture),
            packet_capture_file: self
                .packet_capture_file
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or(d.packet_capture_file),
            capture_capacity: self.capture_capacity.unwrap_or(d.capture_capacity),
            default_remote_endpoint: self
                .default_remote_endpoint
                .unwrap_or(d.default_remote_endpoint),
            allowlist: self.allowlist,
        }
    }
}

impl TransportDescriptorInput {
    /// Resolve into a descriptor and validate it. Invalid values are
    /// rejected, never clamped.
    pub fn resolve(self) -> Result<TransportDescriptor, ConfigError> {
        let desc = match self {
            TransportDescriptorInput::UdpV4(s) => TransportDescriptor::UdpV4(s.resolve()),
            TransportDescriptorInput::UdpV6(s) => TransportDescriptor::UdpV6(s.resolve()),
            TransportDescriptorInput::TcpV4(t) => TransportDescriptor::TcpV4(t.resolve()),
            TransportDescriptorInput::TcpV6(t) => TransportDescriptor::TcpV6(t.resolve()),
            TransportDescriptorInput::Simulated(s) => TransportDescriptor::Simulated(s.resolve()),
            TransportDescriptorInput::Dummy(s) => TransportDescriptor::Dummy(s.resolve()),
        };
        desc.validate()?;
        Ok(desc)
    }
}
