use std::{io, sync::Arc};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;

use crate::{
    RelayConfig,
    conn::Connection,
    error::{FrameError, RegistryGone},
    handshake::UpgradeRequest,
    registry::{Member, Registry},
};

/// Why a connection stopped being served.
#[derive(Debug)]
pub enum Disconnect {
    /// The client sent the sentinel message.
    Sentinel,
    /// The client hung up between frames.
    Hangup,
    /// A frame could not be decoded.
    Frame(FrameError),
    /// The upgrade response could not be written.
    Handshake(io::Error),
    /// The registry task went away.
    Registry(RegistryGone),
}

impl From<RegistryGone> for Disconnect {
    fn from(e: RegistryGone) -> Self { Self::Registry(e) }
}

/// Serves one client from upgrade to teardown.
///
/// Every frame the client sends is relayed to all other members, prefixed with
/// the client's display name. Whatever ends the loop, the connection is
/// unregistered and closed before this returns; other connections are
/// unaffected.
pub async fn serve<S>(
    stream: S,
    request: UpgradeRequest,
    registry: Registry,
    config: Arc<RelayConfig>,
) -> Disconnect
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut conn = Connection::new(stream, request, config.close_frame);
    if let Err(e) = conn.handshake().await {
        tracing::warn!(error = ?e, "handshake failed, dropping connection");
        return Disconnect::Handshake(e);
    }

    let member = match registry.register(conn.sink()).await {
        Ok(m) => m,
        Err(e) => {
            let _ = conn.close().await;
            return e.into();
        }
    };
    conn.assign(member.clone());

    let span = tracing::info_span!("conn", id = %member.id);
    async move {
        let reason = relay_loop(&mut conn, &member, &registry, &config).await;
        teardown(&mut conn, &member, &registry, &reason).await;
        reason
    }
    .instrument(span)
    .await
}

// AwaitFrame -> Dispatch until the client leaves or fails
async fn relay_loop<S>(
    conn: &mut Connection<S>,
    member: &Member,
    registry: &Registry,
    config: &RelayConfig,
) -> Disconnect
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        let frame = match conn.receive().await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => {
                tracing::info!("client hung up");
                return Disconnect::Hangup;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping client");
                conn.set_status(e.close_reason());
                return Disconnect::Frame(e);
            }
        };

        if frame.payload == config.sentinel.as_bytes() {
            tracing::info!("client asked to leave");
            // peers still see the sentinel, as a leave notice
            let notice = conn.encode_outbound(&frame);
            if let Err(e) = registry.unregister(member.id).await {
                return e.into();
            }
            if let Err(e) = conn.close().await {
                tracing::debug!(error = ?e, "close after sentinel");
            }
            return match registry.broadcast(member.id, &notice).await {
                Ok(_) => Disconnect::Sentinel,
                Err(e) => e.into(),
            };
        }

        if let Err(e) = registry
            .broadcast(member.id, &conn.encode_outbound(&frame))
            .await
        {
            return e.into();
        }
    }
}

async fn teardown<S>(
    conn: &mut Connection<S>,
    member: &Member,
    registry: &Registry,
    reason: &Disconnect,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    // both are idempotent, the sentinel path has already done them
    if let Err(e) = registry.unregister(member.id).await {
        tracing::debug!(error = %e, "unregister during teardown");
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(error = ?e, "close during teardown");
    }
    tracing::info!(reason = ?reason, status = conn.status().code(), "disconnected");
}
