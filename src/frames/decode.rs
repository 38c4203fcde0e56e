use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use super::Frame;
use crate::{error::FrameError, protocol::MAX_SHORT_PAYLOAD};

// helper type since decoder errors return FrameError
type Result<T> = std::result::Result<T, FrameError>;

// largest single read issued against the transport
const READ_CHUNK: usize = 4096;

/// Decodes masked client frames from the read side of a connection.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_CHUNK, reader),
        }
    }

    /// Reads the next frame.
    ///
    /// Header and mask are read before the length is checked, and a length
    /// above 125 fails without touching the payload.
    pub async fn next_frame(&mut self) -> Result<Frame> {
        // 0   | 1 2 3 | 4 5 6 7      0    | 1 2 3 4 5 6 7
        // Fin | Rsv   | Opcode       Mask | Payload len
        let head = match self.read_n(2).await {
            Err(FrameError::Truncated { got: 0, .. }) => return Err(FrameError::Closed),
            r => r?,
        };
        let mask: [u8; 4] = self.read_array().await?;

        let length = head[1] & 0x7F;
        if usize::from(length) > MAX_SHORT_PAYLOAD {
            tracing::debug!(length, "declared length needs extended encoding");
            return Err(FrameError::TooLong(length));
        }

        let mut payload = self.read_n(usize::from(length)).await?;
        crate::protocol::unmask(&mut payload, mask);

        let frame = Frame {
            head: head[0],
            length,
            mask,
            payload: payload.freeze(),
        };
        tracing::trace!(
            opcode = ?frame.opcode(),
            fin = frame.is_fin(),
            masked = head[1] & 0x80 != 0,
            len = length,
            "frame decoded"
        );
        Ok(frame)
    }

    async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(&self.read_n(N).await?);
        Ok(out)
    }

    // keep reading until exactly `n` bytes are buffered; EOF before that is an error
    async fn read_n(&mut self, n: usize) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK));
        while buf.len() < n {
            let start = buf.len();
            let want = (n - start).min(READ_CHUNK);
            buf.resize(start + want, 0);

            let got = self.reader.read(&mut buf[start..]).await?;
            buf.truncate(start + got);
            tracing::trace!(want, got, "read socket");

            if got == 0 {
                return Err(FrameError::Truncated {
                    expected: n,
                    got: start,
                });
            }
        }
        Ok(buf)
    }
}
