//! Ordered HTTP/1.1 response writer.
//!
//! A response is written in a fixed order:
//!
//! ```text
//! status line → headers → body
//!                       └→ chunk* → chunk terminator → [trailers]
//! ```
//!
//! Each step is flushed to the transport as soon as it is called. A transport
//! failure leaves the peer with whatever bytes already went out; those cannot
//! be taken back, so the writer moves to [`WriterState::Aborted`] and refuses
//! every further call.

use std::fmt;
use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::chunked;
use super::{Headers, reason_phrase};

/// Errors produced while writing a response.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot {operation} while the writer is in the {state} state")]
    WriterSequenceViolation {
        state: WriterState,
        operation: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Position of a [`ResponseWriter`] within the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet.
    StatusLine,
    /// Status line written; headers are next.
    Headers,
    /// Headers written; a plain body or the first chunk is next.
    Body,
    /// At least one chunk written.
    ChunkedBody,
    /// Chunk terminator written; trailers may follow.
    Trailers,
    /// The response is complete.
    Done,
    /// A transport write failed part-way through the response.
    Aborted,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StatusLine => "status line",
            Self::Headers => "headers",
            Self::Body => "body",
            Self::ChunkedBody => "chunked body",
            Self::Trailers => "trailers",
            Self::Done => "done",
            Self::Aborted => "aborted",
        })
    }
}

/// Builds the headers most responses start from.
///
/// Sets `Content-Length` to `content_length`, `Connection: close`, and
/// `Content-Type: text/plain`. Adjust the result with
/// [`Headers::replace`] and [`Headers::remove`] before writing it.
///
/// # Examples
///
/// ```
/// use httpwire::http::default_headers;
///
/// let mut headers = default_headers(0);
/// headers.remove("Content-Length");
/// headers.replace("Transfer-Encoding", "chunked");
/// headers.set("Trailer", "X-Content-Sha256");
///
/// assert_eq!(headers.get("content-length"), None);
/// assert_eq!(headers.get("connection"), Some("close"));
/// ```
pub fn default_headers(content_length: usize) -> Headers {
    let mut headers = Headers::new();
    headers.set("Content-Length", &content_length.to_string());
    headers.set("Connection", "close");
    headers.set("Content-Type", "text/plain");
    headers
}

/// Writes one response onto `W`, enforcing the status / headers / body order.
///
/// A writer serves exactly one response and is owned by the handler for
/// that request.
///
/// # Examples
///
/// ```
/// use httpwire::http::{ResponseWriter, StatusCode, default_headers};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), httpwire::http::WriteError> {
/// let mut writer = ResponseWriter::new(Vec::new());
/// writer.write_status_line(StatusCode::Ok).await?;
/// writer.write_headers(&default_headers(2)).await?;
/// writer.write_body(b"hi").await?;
///
/// let wire = String::from_utf8(writer.into_inner()).unwrap();
/// assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(wire.ends_with("\r\n\r\nhi"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseWriter<W> {
    inner: W,
    state: WriterState,
    scratch: BytesMut,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Creates a writer in the [`WriterState::StatusLine`] state.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: WriterState::StatusLine,
            scratch: BytesMut::with_capacity(256),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Consumes the writer and returns the transport.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes `HTTP/1.1 <code> <reason>\r\n`.
    ///
    /// Codes without a known reason phrase are written with an empty reason.
    pub async fn write_status_line(&mut self, code: impl Into<u16>) -> Result<(), WriteError> {
        self.expect(&[WriterState::StatusLine], "write the status line")?;
        let code = code.into();
        let _ = write!(self.scratch, "HTTP/1.1 {code} {}\r\n", reason_phrase(code));
        self.flush_scratch(WriterState::Headers).await
    }

    /// Writes every header as `<name>: <value>\r\n`, then the blank line.
    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), WriteError> {
        self.expect(&[WriterState::Headers], "write headers")?;
        let _ = write!(self.scratch, "{headers}\r\n");
        self.flush_scratch(WriterState::Body).await
    }

    /// Writes `body` verbatim. Ends the response.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<(), WriteError> {
        self.expect(&[WriterState::Body], "write the body")?;
        self.scratch.put_slice(body);
        self.flush_scratch(WriterState::Done).await
    }

    /// Writes `data` as one chunk of a chunked body.
    ///
    /// Returns the number of payload bytes written. An empty `data` writes
    /// nothing and leaves the state unchanged; use
    /// [`write_chunk_terminator`](Self::write_chunk_terminator) to end the body.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.expect(&[WriterState::Body, WriterState::ChunkedBody], "write a chunk")?;
        if data.is_empty() {
            return Ok(0);
        }
        chunked::encode_chunk(&mut self.scratch, data);
        self.flush_scratch(WriterState::ChunkedBody).await?;
        Ok(data.len())
    }

    /// Writes the `0\r\n\r\n` terminator that ends a chunked body.
    pub async fn write_chunk_terminator(&mut self) -> Result<(), WriteError> {
        self.expect(
            &[WriterState::Body, WriterState::ChunkedBody],
            "write the chunk terminator",
        )?;
        chunked::encode_terminator(&mut self.scratch);
        self.flush_scratch(WriterState::Trailers).await
    }

    /// Writes `trailers` as header lines followed by a blank line. Ends the response.
    ///
    /// Only names announced in the response's `Trailer` header should be
    /// passed here; the writer does not check this.
    pub async fn write_trailers(&mut self, trailers: &Headers) -> Result<(), WriteError> {
        self.expect(&[WriterState::Trailers], "write trailers")?;
        let _ = write!(self.scratch, "{trailers}\r\n");
        self.flush_scratch(WriterState::Done).await
    }

    fn expect(&self, allowed: &[WriterState], operation: &'static str) -> Result<(), WriteError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(WriteError::WriterSequenceViolation {
                state: self.state,
                operation,
            })
        }
    }

    async fn flush_scratch(&mut self, next: WriterState) -> Result<(), WriteError> {
        let result = self.inner.write_all(&self.scratch).await;
        self.scratch.clear();
        if let Err(e) = result {
            self.state = WriterState::Aborted;
            return Err(e.into());
        }
        trace!(from = %self.state, to = %next, "writer transition");
        self.state = next;
        Ok(())
    }
}
