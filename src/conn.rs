use std::{
    io::Result,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::Mutex,
};

use crate::{
    error::{CloseReason, FrameError},
    frames::{Frame, FrameReader, encode_close, encode_text},
    handshake::{self, UpgradeRequest},
    registry::Member,
};

/// Write side of a connection as seen by other connections' broadcasts.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Writes an already encoded frame and flushes.
    async fn send(&self, frame: &Bytes) -> Result<()>;

    /// Shuts the transport down. Closing twice is a no-op.
    async fn close(&self, status: CloseReason) -> Result<()>;
}

pub(crate) struct ConnInner<W> {
    writer: Mutex<W>,
    closed: AtomicBool,
    close_frame: bool,
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for ConnInner<W> {
    async fn send(&self, frame: &Bytes) -> Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(frame).await?;
        w.flush().await
    }

    async fn close(&self, status: CloseReason) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut w = self.writer.lock().await;
        if self.close_frame {
            tracing::debug!(status = status.code(), "sending close frame");
            // best effort, the transport goes down regardless
            if let Err(e) = w.write_all(&encode_close(status)).await {
                tracing::debug!(error = ?e, "close frame not sent");
            }
        }
        w.shutdown().await
    }
}

/// One upgraded client.
///
/// The relay task serving a connection is its only reader; the registry keeps
/// the write side through [`Connection::sink`] so peers can broadcast to it.
pub struct Connection<S> {
    reader: FrameReader<ReadHalf<S>>,
    inner: Arc<ConnInner<WriteHalf<S>>>,
    request: UpgradeRequest,
    status: CloseReason,
    member: Option<Member>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, request: UpgradeRequest, close_frame: bool) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(reader),
            inner: Arc::new(ConnInner {
                writer: Mutex::new(writer),
                closed: AtomicBool::new(false),
                close_frame,
            }),
            request,
            status: CloseReason::default(),
            member: None,
        }
    }

    /// Answers the upgrade request with `101 Switching Protocols`.
    pub async fn handshake(&self) -> Result<()> {
        let response = handshake::response(self.request.key());
        let mut w = self.inner.writer.lock().await;
        w.write_all(response.as_bytes()).await?;
        w.flush().await?;
        tracing::debug!(path = %self.request.target, "handshake complete");
        Ok(())
    }

    /// Blocks until the next frame arrives.
    pub async fn receive(&mut self) -> std::result::Result<Frame, FrameError> {
        self.reader.next_frame().await
    }

    /// Encodes `frame` for peers, prefixed with this connection's name.
    #[must_use]
    pub fn encode_outbound(&self, frame: &Frame) -> Bytes { encode_text(&frame.prefixed(self.name())) }

    /// Writes an encoded frame to this connection's own client.
    pub async fn send(&self, frame: &Bytes) -> Result<()> { self.inner.send(frame).await }

    /// Closes the transport with the current status.
    pub async fn close(&mut self) -> Result<()> { self.inner.close(self.status).await }

    pub fn sink(&self) -> Arc<dyn FrameSink> { self.inner.clone() }

    #[must_use]
    pub fn name(&self) -> &str { self.member.as_ref().map_or("", |m| m.name.as_str()) }

    #[must_use]
    pub fn status(&self) -> CloseReason { self.status }

    pub(crate) fn set_status(&mut self, status: CloseReason) { self.status = status; }

    pub(crate) fn assign(&mut self, member: Member) { self.member = Some(member); }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;
    use crate::registry::ConnId;

    fn request(key: &str) -> UpgradeRequest {
        UpgradeRequest::from_headers([("Sec-WebSocket-Key", key)])
    }

    #[tokio::test]
    async fn handshake_writes_exact_response() {
        let (mut client, server) = duplex(1024);
        let conn = Connection::new(server, request("dGhlIHNhbXBsZSBub25jZQ=="), false);
        conn.handshake().await.unwrap();

        let expected = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: WebSocket\r\nConnection: \
                        Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let mut buf = vec![0; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[tokio::test]
    async fn outbound_is_prefixed_with_own_name() {
        let (_client, server) = duplex(64);
        let mut conn = Connection::new(server, request("k"), false);
        conn.assign(Member {
            id: ConnId(3),
            name: "Socket 3: ".into(),
        });
        let frame = Frame {
            head: 0x81,
            length: 2,
            mask: [0; 4],
            payload: Bytes::from_static(b"yo"),
        };
        assert_eq!(&conn.encode_outbound(&frame)[..], b"\x81\x0cSocket 3: yo");
    }

    #[tokio::test]
    async fn send_writes_encoded_frame_verbatim() {
        let (mut client, server) = duplex(64);
        let conn = Connection::new(server, request("k"), false);
        conn.send(&encode_text(b"Socket 9: hey")).await.unwrap();

        let mut buf = [0; 15];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x81\x0dSocket 9: hey");
    }

    #[tokio::test]
    async fn close_is_abrupt_by_default() {
        let (mut client, server) = duplex(64);
        let mut conn = Connection::new(server, request("k"), false);
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn close_frame_carries_status_when_enabled() {
        let (mut client, server) = duplex(64);
        let mut conn = Connection::new(server, request("k"), true);
        conn.set_status(CloseReason::TooBig);
        conn.close().await.unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, [0x88, 0x02, 0x03, 0xF1]);
    }
}
