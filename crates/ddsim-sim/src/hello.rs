//! HelloWorld sample and its wire framing.
//!
//! ```text
//!   0       4     6     8                  20      24      28
//!   ┌───────┬─────┬─────┬──────────────────┬───────┬───────┬──────────┐
//!   │ RTPS  │ ver │ vnd │ GUID prefix (12) │ index │  len  │ message… │
//!   └───────┴─────┴─────┴──────────────────┴───────┴───────┴──────────┘
//! ```
//!
//! Integers are little-endian; the message is UTF-8.

use anyhow::{bail, Context};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ddsim_transport::frame::PROTOCOL_MAGIC;

pub const HEADER_LEN: usize = 20;
pub const PROTOCOL_VERSION: [u8; 2] = [2, 3];
pub const VENDOR_ID: [u8; 2] = [0x01, 0x0f];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloWorld {
    pub index: u32,
    pub message: String,
}

impl HelloWorld {
    pub fn new(index: u32, message: impl Into<String>) -> Self {
        HelloWorld {
            index,
            message: message.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + 8 + self.message.len()
    }

    pub fn encode(&self, guid_prefix: &[u8; 12]) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(PROTOCOL_MAGIC);
        buf.put_slice(&PROTOCOL_VERSION);
        buf.put_slice(&VENDOR_ID);
        buf.put_slice(guid_prefix);
        buf.put_u32_le(self.index);
        buf.put_u32_le(self.message.len() as u32);
        buf.put_slice(self.message.as_bytes());
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < HEADER_LEN {
            bail!("frame too short for header: {} bytes", data.len());
        }
        if !data.starts_with(PROTOCOL_MAGIC) {
            bail!("missing RTPS magic");
        }
        let mut body = &data[HEADER_LEN..];
        if body.remaining() < 8 {
            bail!("truncated sample body");
        }
        let index = body.get_u32_le();
        let len = body.get_u32_le() as usize;
        if body.remaining() < len {
            bail!("message length {} exceeds remaining {}", len, body.remaining());
        }
        let message = std::str::from_utf8(&body[..len])
            .context("message is not valid UTF-8")?
            .to_string();
        Ok(HelloWorld { index, message })
    }
}

/// GUID prefix identifying a participant by host and transport id.
pub fn guid_prefix(host_id: u32, transport_id: u32) -> [u8; 12] {
    let mut prefix = [0u8; 12];
    prefix[..4].copy_from_slice(&host_id.to_le_bytes());
    prefix[4..8].copy_from_slice(&transport_id.to_le_bytes());
    prefix[11] = 1;
    prefix
}
