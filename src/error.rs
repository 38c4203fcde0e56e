use std::{fmt, io};

/// Close status codes as specified in
/// [RFC 6455](https://www.rfc-editor.org/rfc/rfc6455.html#section-7.4)
///
/// A [`Connection`](crate::Connection) only carries the subset it can end up
/// in; the status is written out solely when close frames are enabled.
#[repr(u16)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal close
    #[default]
    Normal = 1000,
    /// Going away
    GoingAway = 1001,
    /// Websocket protocol violation
    ProtoError = 1002,
    /// Messages are too big
    TooBig = 1009,
    /// An unexpected condition that prevented the request from being fulfilled
    Unexpected = 1011,
}

impl CloseReason {
    #[must_use]
    pub fn code(self) -> u16 { self as u16 }
}

/// Converts a reason code to bytes of the appropriate endianness.
impl From<CloseReason> for [u8; 2] {
    fn from(value: CloseReason) -> Self { value.code().to_be_bytes() }
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug)]
pub enum FrameError {
    /// The peer hung up before sending the first byte of a frame.
    Closed,
    /// The stream ended part way through a frame.
    Truncated {
        /// Bytes the current read asked for.
        expected: usize,
        /// Bytes that arrived before the stream ended.
        got: usize,
    },
    /// Declared payload length does not fit in the 7-bit length field.
    TooLong(u8),
    /// Underlying transport failure.
    Io(io::Error),
}

impl FrameError {
    /// Status a connection should carry after failing with this error.
    #[must_use]
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::Closed => CloseReason::Normal,
            Self::Truncated { .. } => CloseReason::ProtoError,
            Self::TooLong(_) => CloseReason::TooBig,
            Self::Io(_) => CloseReason::Unexpected,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Truncated { expected, got } => {
                write!(f, "stream ended mid-frame: wanted {expected} bytes, got {got}")
            }
            Self::TooLong(len) => write!(f, "message is too long (length field {len})"),
            Self::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

/// Errors that can occur while reading the HTTP request that precedes an upgrade.
#[derive(Debug)]
pub enum UpgradeError {
    /// Failed to bind TCP listener.
    Bind,
    /// Failed to read from the TCP stream.
    Read,
    /// Failed to write to the TCP stream.
    Write,
    /// The stream ended before the blank line terminating the headers.
    Incomplete,
    /// The request head did not end within the size limit.
    TooLarge(usize),
    /// The request line was not an HTTP request line.
    RequestLine(String),
    /// The listener stopped accepting clients.
    Accept(io::Error),
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => write!(f, "failed to bind listener"),
            Self::Read => write!(f, "failed to read upgrade request"),
            Self::Write => write!(f, "failed to write upgrade response"),
            Self::Incomplete => write!(f, "upgrade request ended before end of headers"),
            Self::TooLarge(limit) => write!(f, "upgrade request head exceeds {limit} bytes"),
            Self::RequestLine(line) => write!(f, "malformed request line: {line:?}"),
            Self::Accept(e) => write!(f, "failed to accept client: {e}"),
        }
    }
}

impl std::error::Error for UpgradeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Accept(e) => Some(e),
            _ => None,
        }
    }
}

/// The registry task has stopped and can no longer serve requests.
#[derive(Debug)]
pub struct RegistryGone;

impl fmt::Display for RegistryGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "registry task is gone") }
}

impl std::error::Error for RegistryGone {}
