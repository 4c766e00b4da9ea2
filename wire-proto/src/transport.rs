use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::bytes::BytesMut;

use wire_sasl::encode::Encode;
use wire_sasl::{Outcome, ProtocolError};

pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("unable to encode frame: {0}")]
    Encode(String),
}

impl From<LineError> for Outcome {
    fn from(e: LineError) -> Self {
        match e {
            LineError::Io(e) => Outcome::TransportError(e.to_string()),
            LineError::Protocol(e) => Outcome::ProtocolError(e),
            LineError::Encode(e) => Outcome::ProtocolError(ProtocolError::Malformed(e)),
        }
    }
}

/// Newline delimited frames over any byte stream. Knows nothing of SASL.
pub struct LineTransport<S> {
    stream: BufStream<S>,
    read_buf: Vec<u8>,
    write_buf: BytesMut,
}

impl LineTransport<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, LineError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            read_buf: Vec::new(),
            write_buf: BytesMut::new(),
        }
    }

    /// Returns the next frame without its line ending, None once the peer is gone.
    /// A trailing chunk without line feed is dropped.
    ///
    /// Cancel safe: bytes already read are kept for the next call.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, LineError> {
        loop {
            let budget = (MAX_LINE_LEN + 1).saturating_sub(self.read_buf.len()) as u64;
            let bread = (&mut self.stream)
                .take(budget)
                .read_until(b'\n', &mut self.read_buf)
                .await?;

            if self.read_buf.last() == Some(&b'\n') {
                let mut line = std::mem::take(&mut self.read_buf);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            if self.read_buf.len() > MAX_LINE_LEN {
                let len = self.read_buf.len();
                self.read_buf.clear();
                return Err(ProtocolError::LineTooLong(len).into());
            }

            if bread == 0 {
                if !self.read_buf.is_empty() {
                    tracing::debug!(
                        len = self.read_buf.len(),
                        "Connection closed in the middle of a line"
                    );
                    self.read_buf.clear();
                }
                return Ok(None);
            }
        }
    }

    /// Writes the bytes followed by a line feed and flushes
    pub async fn send_line(&mut self, line: &[u8]) -> Result<(), LineError> {
        self.stream.write_all(line).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn send<F: Encode + std::fmt::Debug>(&mut self, frame: &F) -> Result<(), LineError> {
        self.write_buf.clear();
        frame
            .encode(&mut self.write_buf)
            .map_err(|e| LineError::Encode(e.to_string()))?;
        tracing::trace!(frame=?frame, "Sent frame");
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        self.write_buf.clear();
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), LineError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire_sasl::types::ServerFrame;

    #[tokio::test]
    async fn lines_are_split_and_stripped() {
        let (a, b) = tokio::io::duplex(1024);
        let mut tx = LineTransport::new(a);
        let mut rx = LineTransport::new(b);

        tx.send_line(b"PLAIN LOGIN").await.unwrap();
        tx.send_line(b"C,AGFsaWNl\r").await.unwrap();
        tx.send_line(b"").await.unwrap();
        tx.send(&ServerFrame::Success).await.unwrap();
        drop(tx);

        assert_eq!(rx.read_line().await.unwrap(), Some(b"PLAIN LOGIN".to_vec()));
        assert_eq!(rx.read_line().await.unwrap(), Some(b"C,AGFsaWNl".to_vec()));
        assert_eq!(rx.read_line().await.unwrap(), Some(vec![]));
        assert_eq!(rx.read_line().await.unwrap(), Some(b"A".to_vec()));
        assert_eq!(rx.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_line_at_eof_is_dropped() {
        let (mut a, b) = tokio::io::duplex(1024);
        let mut rx = LineTransport::new(b);

        a.write_all(b"A").await.unwrap();
        drop(a);

        assert_eq!(rx.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn overlong_line_is_refused() {
        let (mut a, b) = tokio::io::duplex(4096);
        let mut rx = LineTransport::new(b);

        tokio::spawn(async move {
            let chunk = vec![b'x'; 4096];
            for _ in 0..(MAX_LINE_LEN / 4096 + 2) {
                if a.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        assert!(matches!(
            rx.read_line().await,
            Err(LineError::Protocol(ProtocolError::LineTooLong(_)))
        ));
    }

    #[test]
    fn errors_map_to_outcomes() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            Outcome::from(LineError::from(io)),
            Outcome::TransportError(_)
        ));
        assert_eq!(
            Outcome::from(LineError::from(ProtocolError::InvalidBase64)),
            Outcome::ProtocolError(ProtocolError::InvalidBase64)
        );
    }
}
