use std::{io::Result, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::Instrument;

use crate::{RelayConfig, UpgradeError, handshake::UpgradeRequest, registry::Registry, relay};

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n";

/// Accepts TCP clients and relays between them.
pub struct RelayServer {
    listener: TcpListener,
    registry: Registry,
    config: Arc<RelayConfig>,
}

impl RelayServer {
    /// Binds the listener and starts the registry task.
    pub async fn bind(config: RelayConfig) -> std::result::Result<Self, UpgradeError> {
        let listener = TcpListener::bind(config.addr.as_str()).await.map_err(|e| {
            tracing::error!(addr = %config.addr, error = ?e, "bind failed");
            UpgradeError::Bind
        })?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "listening");
        }
        Ok(Self {
            listener,
            registry: Registry::spawn(config.backlog),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> { self.listener.local_addr() }

    /// Handle to the room, shared with every served connection.
    #[must_use]
    pub fn registry(&self) -> &Registry { &self.registry }

    /// Runs the accept loop, one task per client. Only a listener failure
    /// ends it.
    pub async fn run(self) -> std::result::Result<(), UpgradeError> {
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                tracing::error!(error = ?e, "accept failed");
                UpgradeError::Accept(e)
            })?;
            let registry = self.registry.clone();
            let config = self.config.clone();
            let span = tracing::info_span!("client", peer = %peer);
            tokio::spawn(
                async move {
                    tracing::debug!("accepted");
                    accept(stream, registry, config).await;
                }
                .instrument(span),
            );
        }
    }
}

// Read the request head, then hand the raw stream to the relay. A request
// that can't be read is abandoned before any connection exists.
async fn accept(stream: TcpStream, registry: Registry, config: Arc<RelayConfig>) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = ?e, "set_nodelay failed");
    }
    let mut reader = BufReader::new(stream);
    let request = match UpgradeRequest::read_from(&mut reader).await {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting upgrade");
            if matches!(e, UpgradeError::RequestLine(_)) {
                let sent = reject(reader.get_mut()).await;
                if let Err(e) = sent {
                    tracing::debug!(error = %e, "400 not sent");
                }
            }
            return;
        }
    };

    // the BufReader stays in front of the stream: frames sent right behind
    // the request head may already be buffered
    let reason = relay::serve(reader, request, registry, config).await;
    tracing::debug!(reason = ?reason, "connection finished");
}

async fn reject<W: AsyncWrite + Unpin>(w: &mut W) -> std::result::Result<(), UpgradeError> {
    w.write_all(BAD_REQUEST).await.map_err(|e| {
        tracing::trace!(error = ?e, "writing 400");
        UpgradeError::Write
    })?;
    w.flush().await.map_err(|_| UpgradeError::Write)
}
