mod mask;

pub(crate) use mask::unmask;

/// GUID appended to the client key before hashing, fixed by RFC 6455.
pub(crate) const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload a single-byte length field can carry.
pub const MAX_SHORT_PAYLOAD: usize = 125;
