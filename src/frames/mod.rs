mod decode;
mod encode;
mod opcode;

use bytes::Bytes;

pub use decode::FrameReader;
pub use encode::{encode_close, encode_text};
pub(crate) use opcode::Opcode;

/// A single client frame after unmasking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw FIN/RSV/opcode byte, kept for logging only.
    pub head: u8,
    /// Declared payload length, at most 125.
    pub length: u8,
    pub mask: [u8; 4],
    pub payload: Bytes,
}

impl Frame {
    pub(crate) fn is_fin(&self) -> bool { self.head & 0x80 != 0 }

    pub(crate) fn opcode(&self) -> Option<Opcode> { Opcode::try_from(self.head).ok() }

    /// Payload to relay, prefixed with the sender's display name.
    #[must_use]
    pub fn prefixed(&self, name: &str) -> Bytes {
        let mut buf = Vec::with_capacity(name.len() + self.payload.len());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf.into()
    }
}
