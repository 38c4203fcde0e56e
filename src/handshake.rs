use std::collections::HashMap;

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{error::UpgradeError, protocol::WS_GUID};

type Result<T> = std::result::Result<T, UpgradeError>;

// upper bound on the request head so a client can't stream headers forever
const MAX_HEAD_LEN: usize = 8 * 1024;

/// Computes the `Sec-WebSocket-Accept` value for a client key.
///
/// The key is not validated: an empty or malformed key still hashes to a value.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Builds the `101 Switching Protocols` response for a client key.
#[must_use]
pub fn response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    )
}

/// Head of the HTTP request that asked for the upgrade.
#[derive(Debug, Default, Clone)]
pub struct UpgradeRequest {
    pub target: String,
    headers: HashMap<String, String>,
}

impl UpgradeRequest {
    /// Builds a request from header pairs. Names are matched case-insensitively
    /// and a repeated name keeps its last value.
    pub fn from_headers<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut req = Self {
            target: "/".into(),
            headers: HashMap::new(),
        };
        for (k, v) in headers {
            req.insert(k.as_ref(), v.into());
        }
        req
    }

    /// Reads the request line and headers up to the terminating blank line.
    ///
    /// Nothing past the blank line is consumed, so the reader can go on to
    /// carry the upgraded stream. The whole head, request line included, must
    /// fit in `MAX_HEAD_LEN` bytes.
    pub async fn read_from<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut consumed = 0;
        let mut line = String::new();
        consumed += read_line(reader, &mut line, MAX_HEAD_LEN).await?;

        let mut parts = line.split_whitespace();
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(UpgradeError::RequestLine(line.trim_end().to_string()));
        };
        if !version.starts_with("HTTP/") {
            return Err(UpgradeError::RequestLine(line.trim_end().to_string()));
        }
        let method = method.to_string();

        let mut req = Self {
            target: target.to_string(),
            headers: HashMap::new(),
        };

        // collect headers until the empty line
        loop {
            line.clear();
            consumed += read_line(reader, &mut line, MAX_HEAD_LEN - consumed).await?;

            let line = line.trim_end(); // remove \r\n
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                req.insert(name.trim(), value.trim().to_string());
            }
        }

        tracing::debug!(
            method = %method,
            path = %req.target,
            headers = req.headers.len(),
            "parsed upgrade request"
        );
        Ok(req)
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The client's `Sec-WebSocket-Key`, empty when absent.
    #[must_use]
    pub fn key(&self) -> &str { self.header("Sec-WebSocket-Key").unwrap_or_default() }

    fn insert(&mut self, name: &str, value: String) {
        self.headers.insert(name.to_ascii_lowercase(), value);
    }
}

// Reads one line, never pulling more than `budget` bytes off the reader. A
// line still unterminated when the budget runs out overflows the head.
async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
    budget: usize,
) -> Result<usize> {
    let limit = u64::try_from(budget).unwrap_or(u64::MAX);
    match (&mut *reader).take(limit).read_line(line).await {
        Ok(n) if n == budget && !line.ends_with('\n') => {
            tracing::warn!(limit = MAX_HEAD_LEN, "request head too large");
            Err(UpgradeError::TooLarge(MAX_HEAD_LEN))
        }
        Ok(0) => Err(UpgradeError::Incomplete),
        Ok(n) => Ok(n),
        Err(e) => {
            tracing::debug!(error = ?e, "reading request head");
            Err(UpgradeError::Read)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, BufReader};

    use super::*;

    #[test]
    fn rfc_test_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn accept_is_deterministic_even_for_empty_key() {
        assert_eq!(accept_key(""), accept_key(""));
        assert_eq!(accept_key("not base64 at all"), accept_key("not base64 at all"));
        assert_ne!(accept_key(""), accept_key("x"));
    }

    #[test]
    fn response_is_bit_exact() {
        assert_eq!(
            response("dGhlIHNhbXBsZSBub25jZQ=="),
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: WebSocket\r\nConnection: \
             Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn parses_head_and_leaves_body() {
        let raw = b"GET /chat HTTP/1.1\r\n\
                    Host: localhost:8080\r\n\
                    sec-websocket-key: abc==\r\n\
                    Upgrade: websocket\r\n\r\n\x81\x80";
        let mut reader = BufReader::new(&raw[..]);
        let req = UpgradeRequest::read_from(&mut reader).await.unwrap();

        assert_eq!(req.target, "/chat");
        assert_eq!(req.key(), "abc==");
        assert_eq!(req.header("UPGRADE"), Some("websocket"));
        assert_eq!(reader.buffer(), b"\x81\x80");
    }

    #[tokio::test]
    async fn missing_key_is_empty() {
        let mut reader = BufReader::new(&b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
        let req = UpgradeRequest::read_from(&mut reader).await.unwrap();
        assert_eq!(req.key(), "");
    }

    #[tokio::test]
    async fn rejects_truncated_and_garbage_heads() {
        let mut reader = BufReader::new(&b"GET / HTTP/1.1\r\nHost: x\r\n"[..]);
        assert!(matches!(
            UpgradeRequest::read_from(&mut reader).await,
            Err(UpgradeError::Incomplete)
        ));

        let mut reader = BufReader::new(&b"\x16\x03\x01 hello\r\n\r\n"[..]);
        assert!(matches!(
            UpgradeRequest::read_from(&mut reader).await,
            Err(UpgradeError::RequestLine(_))
        ));
    }

    #[tokio::test]
    async fn endless_header_line_is_cut_off() {
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        // the writer stalls once the reader stops pulling; dropping the
        // reader fails its pending write
        tokio::spawn(async move {
            let _ = client.write_all(b"GET / HTTP/1.1\r\nX-Big: ").await;
            let _ = client.write_all(&vec![b'a'; 512 * 1024]).await;
        });

        let mut reader = BufReader::new(server);
        let res = tokio::time::timeout(
            Duration::from_millis(500),
            UpgradeRequest::read_from(&mut reader),
        )
        .await
        .expect("head limit not enforced");
        assert!(matches!(res, Err(UpgradeError::TooLarge(MAX_HEAD_LEN))));
    }

    #[tokio::test]
    async fn endless_request_line_is_cut_off() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_LEN * 2));
        let mut reader = BufReader::new(&raw[..]);
        assert!(matches!(
            UpgradeRequest::read_from(&mut reader).await,
            Err(UpgradeError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn many_short_headers_share_one_limit() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..1024 {
            raw.extend_from_slice(format!("X-{i}: v\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let mut reader = BufReader::new(&raw[..]);
        assert!(matches!(
            UpgradeRequest::read_from(&mut reader).await,
            Err(UpgradeError::TooLarge(_))
        ));
    }
}
