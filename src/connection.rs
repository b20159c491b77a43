use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ServerError;
use crate::resp::*;

/// Bytes requested from the socket per read call.
pub const READ_CHUNK: usize = 1024;

/// Frames requests and writes replies over one transport link.
///
/// Incoming bytes are buffered until a whole frame is present, so frames may
/// span several reads and one read may carry several frames.
pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    parser: RequestParser,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            parser: RequestParser::new(),
        }
    }

    /// Reads up to `READ_CHUNK` more bytes into the buffer. Returns 0 on EOF.
    async fn read_chunk(&mut self) -> Result<usize, ServerError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.stream.read(&mut chunk).await?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn closed_mid_frame() -> ServerError {
        std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed in the middle of a frame",
        )
        .into()
    }

    /// Reads the next request.
    ///
    /// Returns `Ok(None)` when the peer closes the connection between frames.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ServerError> {
        loop {
            if let Some(request) = self.parser.parse(&mut self.buffer)? {
                return Ok(Some(request));
            }
            if self.read_chunk().await? == 0 {
                if self.parser.is_idle() && leading_whitespace(&self.buffer) == self.buffer.len() {
                    return Ok(None);
                }
                return Err(Self::closed_mid_frame());
            }
        }
    }

    /// Reads one reply. End of stream is an error here.
    pub async fn read_reply(&mut self) -> Result<Reply, ServerError> {
        loop {
            if let Some((reply, used)) = parse_reply(&self.buffer)? {
                self.buffer.advance(used);
                return Ok(reply);
            }
            if self.read_chunk().await? == 0 {
                return Err(Self::closed_mid_frame());
            }
        }
    }

    /// Reads a raw bulk transfer (`$<len>\r\n` + payload, no CRLF).
    pub async fn read_bulk_transfer(&mut self) -> Result<Vec<u8>, ServerError> {
        loop {
            if let Some((payload, used)) = parse_bulk_transfer(&self.buffer)? {
                let payload = payload.to_vec();
                self.buffer.advance(used);
                return Ok(payload);
            }
            if self.read_chunk().await? == 0 {
                return Err(Self::closed_mid_frame());
            }
        }
    }

    /// Drops everything the peer sends until it closes. Returns the byte count.
    pub async fn discard_until_eof(&mut self) -> Result<usize, ServerError> {
        let mut total = self.buffer.len();
        self.buffer.clear();
        loop {
            let n = self.read_chunk().await?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
            self.buffer.clear();
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), ServerError> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    pub async fn write_error(&mut self, msg: &str) -> Result<(), ServerError> {
        self.write(encode_error(msg).as_bytes()).await
    }

    /// Sends `text` split on whitespace as an array of bulk strings.
    pub async fn write_array(&mut self, text: &str) -> Result<(), ServerError> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        self.write(encode_array(parts.as_slice()).as_bytes()).await
    }

    pub async fn write_bulk_transfer(&mut self, data: &[u8]) -> Result<(), ServerError> {
        self.write(&encode_bulk_transfer(data)).await
    }
}
