use bytes::Bytes;

/// Magic prefix of the middleware's wire protocol.
pub const PROTOCOL_MAGIC: &[u8; 4] = b"RTPS";

/// A serialized message in transit, tagged with its `"address:port"`
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub data: Bytes,
    pub destination: String,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, destination: impl Into<String>) -> Self {
        Frame {
            data: data.into(),
            destination: destination.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_protocol_magic(&self) -> bool {
        has_protocol_magic(&self.data)
    }
}

/// Whether `data` opens with the wire-protocol magic.
pub fn has_protocol_magic(data: &[u8]) -> bool {
    data.starts_with(PROTOCOL_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_detection() {
        assert!(Frame::new(&b"RTPS\x02\x03"[..], "127.0.0.1:7412").has_protocol_magic());
        assert!(!Frame::new(&b"RTP"[..], "127.0.0.1:7412").has_protocol_magic());
        assert!(!Frame::new(Bytes::new(), "127.0.0.1:7412").has_protocol_magic());
    }

    #[test]
    fn equality_covers_destination() {
        let a = Frame::new(&b"abc"[..], "127.0.0.1:1");
        let b = Frame::new(&b"abc"[..], "127.0.0.1:2");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
