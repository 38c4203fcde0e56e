#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! Single-room WebSocket broadcast relay.
//!
//! Clients upgrade over plain HTTP/1.1, then every text frame one client sends
//! is relayed to all the others, prefixed with the sender's display name
//! (`"Socket N: "`). Sending `EXIT` disconnects the sender.
//!
//! Only unfragmented client frames of up to 125 bytes are understood; there is
//! no ping/pong, no compression and no close handshake unless
//! [`RelayConfig::close_frame`] is set.

mod config;
mod conn;
mod error;
mod frames;
mod handshake;
mod protocol;
mod registry;
mod relay;
mod server;

pub use config::RelayConfig;
pub use conn::{Connection, FrameSink};
pub use error::{CloseReason, FrameError, RegistryGone, UpgradeError};
pub use frames::{Frame, FrameReader, encode_close, encode_text};
pub use handshake::{UpgradeRequest, accept_key};
pub use protocol::MAX_SHORT_PAYLOAD;
pub use registry::{ConnId, Member, Peer, Registry};
pub use relay::{Disconnect, serve};
pub use server::RelayServer;
