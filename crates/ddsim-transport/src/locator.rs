//! # Locators
//!
//! Endpoint identity: transport kind, address and port. Two locators are the
//! same channel if every field is equal.

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Endpoint assumed when a frame carries no parseable destination.
pub const DEFAULT_REMOTE_ENDPOINT: &str = "127.0.0.1:7412";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LocatorKind {
    UdpV4,
    UdpV6,
    TcpV4,
    TcpV6,
    Simulated,
}

impl LocatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorKind::UdpV4 => "udpv4",
            LocatorKind::UdpV6 => "udpv6",
            LocatorKind::TcpV4 => "tcpv4",
            LocatorKind::TcpV6 => "tcpv6",
            LocatorKind::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Locator {
    pub kind: LocatorKind,
    pub address: IpAddr,
    pub port: u16,
}

impl Locator {
    pub fn new(kind: LocatorKind, address: IpAddr, port: u16) -> Self {
        Locator {
            kind,
            address,
            port,
        }
    }

    pub fn udp_v4(octets: [u8; 4], port: u16) -> Self {
        Self::new(LocatorKind::UdpV4, IpAddr::V4(Ipv4Addr::from(octets)), port)
    }

    pub fn udp_v6(address: Ipv6Addr, port: u16) -> Self {
        Self::new(LocatorKind::UdpV6, IpAddr::V6(address), port)
    }

    pub fn simulated(port: u16) -> Self {
        Self::new(
            LocatorKind::Simulated,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        )
    }

    /// Parse `"host:port"` (or `"[v6]:port"`) into a UDP locator of the
    /// matching address family. Returns `None` for anything else.
    pub fn parse_endpoint(endpoint: &str) -> Option<Self> {
        let addr: SocketAddr = endpoint.trim().parse().ok()?;
        Some(Self::from_socket_addr(addr))
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        let kind = match addr.ip() {
            IpAddr::V4(_) => LocatorKind::UdpV4,
            IpAddr::V6(_) => LocatorKind::UdpV6,
        };
        Self::new(kind, addr.ip(), addr.port())
    }

    /// Same kind and port. An input channel opened on a wildcard or
    /// alternate address still receives frames sent to its port.
    pub fn matches(&self, other: &Locator) -> bool {
        self.kind == other.kind && self.port == other.port
    }

    /// `"address:port"` form carried in a frame's destination.
    pub fn endpoint(&self) -> String {
        SocketAddr::new(self.address, self.port).to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}",
            self.kind.as_str(),
            SocketAddr::new(self.address, self.port)
        )
    }
}
