use std::fmt;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::headers::Headers;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("invalid write state: operations must be called in order (status, headers, body)")]
    InvalidWriteState,

    #[error("cannot flush response: status code not set")]
    StatusNotSet,

    #[error("io error while writing response: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase for the status line. Codes without a canned phrase get
    /// an empty one.
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Init,
    StatusWritten,
    HeadersWritten,
    BodyBuffered,
    ChunkedBodyStarted,
    ChunkedBodyDone,
    TrailersWritten,
}

/// Emits one HTTP/1.1 response over `sink`, gating every operation on a
/// state machine so the wire format stays well formed: status before
/// headers, headers before body, chunk terminator before trailers.
///
/// Non-chunked responses are buffered in full and written by [`flush`] with
/// an auto-computed `content-length`. Chunked responses stream through to
/// the sink; the status line and header block go out with the first chunk.
///
/// [`flush`]: ResponseWriter::flush
pub struct ResponseWriter<W> {
    sink: W,
    state: WriteState,
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
    chunked: bool,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: WriteState::Init,
            status: None,
            headers: Headers::new(),
            body: BytesMut::new(),
            chunked: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Records the status code for the status line. Must be the first call.
    pub fn write_status(&mut self, status: StatusCode) -> Result<(), WriteError> {
        if self.state != WriteState::Init {
            return Err(WriteError::InvalidWriteState);
        }

        self.status = Some(status);
        self.state = WriteState::StatusWritten;
        Ok(())
    }

    /// Merges `headers` into the response, replacing on name collision.
    /// A merged `transfer-encoding: chunked` switches the writer to chunked
    /// mode.
    pub fn write_headers(&mut self, headers: Headers) -> Result<(), WriteError> {
        if self.state != WriteState::StatusWritten {
            return Err(WriteError::InvalidWriteState);
        }

        self.merge_headers(headers);
        self.state = WriteState::HeadersWritten;
        Ok(())
    }

    /// Buffers the response body; nothing reaches the sink until [`flush`].
    ///
    /// [`flush`]: ResponseWriter::flush
    pub fn write_body(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.state != WriteState::HeadersWritten {
            return Err(WriteError::InvalidWriteState);
        }

        self.body.extend_from_slice(data);
        self.state = WriteState::BodyBuffered;
        Ok(data.len())
    }

    /// Emits one chunk: hex length, CRLF, payload, CRLF. The first call
    /// also emits the status line and header block. An empty payload emits
    /// no chunk (a zero-length chunk would terminate the stream).
    pub async fn write_chunked_body(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.state != WriteState::HeadersWritten && self.state != WriteState::ChunkedBodyStarted
        {
            return Err(WriteError::InvalidWriteState);
        }

        self.chunked = true;
        if self.state == WriteState::HeadersWritten {
            self.send_head().await?;
        }
        self.state = WriteState::ChunkedBodyStarted;

        if data.is_empty() {
            return Ok(0);
        }

        let size_line = format!("{:x}\r\n", data.len());
        self.sink.write_all(size_line.as_bytes()).await?;
        self.sink.write_all(data).await?;
        self.sink.write_all(b"\r\n").await?;
        Ok(data.len())
    }

    /// Terminates the chunk stream with the zero-length chunk. The final
    /// blank line is written by [`write_trailers`] or [`flush`].
    ///
    /// [`write_trailers`]: ResponseWriter::write_trailers
    /// [`flush`]: ResponseWriter::flush
    pub async fn write_chunked_body_done(&mut self) -> Result<(), WriteError> {
        if self.state != WriteState::ChunkedBodyStarted {
            return Err(WriteError::InvalidWriteState);
        }

        self.sink.write_all(b"0\r\n").await?;
        self.state = WriteState::ChunkedBodyDone;
        Ok(())
    }

    /// Emits trailer fields after a terminated chunk stream, then the final
    /// blank line.
    pub async fn write_trailers(&mut self, trailers: Headers) -> Result<(), WriteError> {
        if self.state != WriteState::ChunkedBodyDone {
            return Err(WriteError::InvalidWriteState);
        }

        for (name, value) in trailers.iter() {
            self.sink.write_all(format!("{name}: {value}\r\n").as_bytes()).await?;
        }
        self.sink.write_all(b"\r\n").await?;
        self.state = WriteState::TrailersWritten;
        Ok(())
    }

    /// Finalizes the response. Buffered-body responses get their status
    /// line, headers (with `content-length` set to the buffered length) and
    /// body written out here; chunked responses get their missing
    /// terminators.
    pub async fn flush(&mut self) -> Result<(), WriteError> {
        match self.state {
            WriteState::Init => return Err(WriteError::StatusNotSet),
            WriteState::StatusWritten => {
                self.state = WriteState::HeadersWritten;
            }
            _ => {}
        }

        match self.state {
            WriteState::TrailersWritten => Ok(()),
            WriteState::ChunkedBodyDone => {
                self.sink.write_all(b"\r\n").await?;
                self.sink.flush().await?;
                self.state = WriteState::TrailersWritten;
                Ok(())
            }
            WriteState::ChunkedBodyStarted => {
                // the handler never called write_chunked_body_done
                self.sink.write_all(b"0\r\n\r\n").await?;
                self.sink.flush().await?;
                self.state = WriteState::TrailersWritten;
                Ok(())
            }
            _ => {
                if !self.chunked {
                    self.headers.set("content-length", &self.body.len().to_string());
                }
                self.send_head().await?;
                self.sink.write_all(&self.body).await?;
                self.sink.flush().await?;
                Ok(())
            }
        }
    }

    fn merge_headers(&mut self, headers: Headers) {
        for (name, value) in headers.iter() {
            self.headers.set(name, value);
        }
        if self.headers.get("transfer-encoding") == Some("chunked") {
            self.chunked = true;
        }
    }

    async fn send_head(&mut self) -> Result<(), WriteError> {
        let status = self.status.ok_or(WriteError::StatusNotSet)?;

        let mut head = BytesMut::new();
        head.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason_phrase()).as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            head.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        head.extend_from_slice(b"\r\n");

        self.sink.write_all(&head).await?;
        Ok(())
    }
}
