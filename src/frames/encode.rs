use byteorder::{BigEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use super::Opcode;
use crate::{error::CloseReason, protocol::MAX_SHORT_PAYLOAD};

/// Encodes a single unmasked, final text frame.
///
/// Payloads that don't fit the 7-bit length use the 16-bit or 64-bit
/// extended length instead of truncating the length byte.
#[must_use]
pub fn encode_text(payload: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(payload.len() + 10);
    buf.push(0x80 | Opcode::Text as u8);

    // writes into a Vec can't fail, hence the ignored results
    #[allow(clippy::cast_possible_truncation)]
    match payload.len() {
        // server frames never set the MASK bit
        len @ 0..=MAX_SHORT_PAYLOAD => buf.push(len as u8),
        len @ 126..=0xFFFF => {
            tracing::debug!(len, "outbound frame uses 16-bit length");
            buf.push(126);
            let _ = buf.write_u16::<BigEndian>(len as u16);
        }
        len => {
            tracing::debug!(len, "outbound frame uses 64-bit length");
            buf.push(127);
            let _ = buf.write_u64::<BigEndian>(len as u64);
        }
    }

    buf.extend_from_slice(payload);
    tracing::trace!(len = payload.len(), "encoded TEXT");
    buf.into()
}

/// Encodes a close frame carrying only a status code.
#[must_use]
pub fn encode_close(status: CloseReason) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u8(0x80 | Opcode::Close as u8);
    buf.put_u8(2);
    buf.extend_from_slice(&<[u8; 2]>::from(status));
    buf.freeze()
}
