//! Chunked transfer coding (RFC 9112 §7.1).
//!
//! The encoder side is two free functions used by
//! [`ResponseWriter`](super::ResponseWriter). The decoder follows the same
//! feed contract as [`RequestParser`](super::RequestParser): it consumes only
//! complete tokens and reports `0` when it needs more bytes.

use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tracing::trace;

use super::headers::{self, HeaderError, Headers};

/// The zero-length chunk that ends a chunked body.
pub const TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Appends `data` as one chunk: `<hex-len>\r\n<data>\r\n`.
///
/// Empty `data` appends nothing, since a zero-length chunk would end the body.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use httpwire::http::chunked::encode_chunk;
///
/// let mut dst = BytesMut::new();
/// encode_chunk(&mut dst, b"abc");
/// assert_eq!(&dst[..], b"3\r\nabc\r\n");
/// ```
pub fn encode_chunk(dst: &mut BytesMut, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    dst.reserve(data.len() + 20);
    // Writing into a BytesMut cannot fail.
    let _ = write!(dst, "{:x}\r\n", data.len());
    dst.put_slice(data);
    dst.put_slice(b"\r\n");
}

/// Appends the chunked-body terminator `0\r\n\r\n`.
pub fn encode_terminator(dst: &mut BytesMut) {
    dst.put_slice(TERMINATOR);
}

/// Errors produced while decoding a chunked body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkedError {
    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    #[error("chunk data not followed by CRLF")]
    MissingChunkDelimiter,

    #[error("invalid trailer: {0}")]
    Trailer(#[from] HeaderError),

    #[error("decoder already reached the end of the body")]
    DecoderAlreadyComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a `<hex-len>[;ext]\r\n` line.
    Size,
    /// Reading chunk payload.
    Data { remaining: u64 },
    /// Expecting the CRLF after a payload.
    DataEnd,
    /// Reading trailer lines until the blank line.
    Trailers,
    Done,
}

/// Incremental decoder for a chunked body.
///
/// # Examples
///
/// ```
/// use httpwire::http::chunked::ChunkedDecoder;
///
/// let mut decoder = ChunkedDecoder::new();
/// let wire = b"5\r\nhello\r\n6\r\n world\r\n0\r\nX-Sum: 11\r\n\r\n";
/// assert_eq!(decoder.feed(wire).unwrap(), wire.len());
/// assert!(decoder.is_done());
/// assert_eq!(decoder.payload(), b"hello world");
/// assert_eq!(decoder.trailers().get("x-sum"), Some("11"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: DecodeState,
    payload: BytesMut,
    trailers: Headers,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Creates a decoder waiting for the first chunk size line.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Size,
            payload: BytesMut::new(),
            trailers: Headers::new(),
        }
    }

    /// Consumes as much of `buf` as forms complete tokens and returns the count.
    ///
    /// # Errors
    ///
    /// Returns a [`ChunkedError`] on malformed input, or
    /// [`ChunkedError::DecoderAlreadyComplete`] if called after the end of the body.
    pub fn feed(&mut self, buf: &[u8]) -> Result<usize, ChunkedError> {
        if self.state == DecodeState::Done {
            return Err(ChunkedError::DecoderAlreadyComplete);
        }

        let mut total = 0;
        while self.state != DecodeState::Done {
            let consumed = self.step(&buf[total..])?;
            if consumed == 0 {
                break;
            }
            total += consumed;
        }
        Ok(total)
    }

    fn step(&mut self, data: &[u8]) -> Result<usize, ChunkedError> {
        match self.state {
            DecodeState::Size => {
                let Some(idx) = headers::find_crlf(data) else {
                    return Ok(0);
                };
                let size = parse_size_line(&data[..idx])?;
                trace!(size, "chunk size");
                self.state = if size == 0 {
                    DecodeState::Trailers
                } else {
                    DecodeState::Data { remaining: size }
                };
                Ok(idx + 2)
            }
            DecodeState::Data { remaining } => {
                let take = usize::try_from(remaining).map_or(data.len(), |r| r.min(data.len()));
                if take == 0 {
                    return Ok(0);
                }
                self.payload.extend_from_slice(&data[..take]);
                let left = remaining - take as u64;
                self.state = if left == 0 {
                    DecodeState::DataEnd
                } else {
                    DecodeState::Data { remaining: left }
                };
                Ok(take)
            }
            DecodeState::DataEnd => match data {
                [b'\r', b'\n', ..] => {
                    self.state = DecodeState::Size;
                    Ok(2)
                }
                [] | [b'\r'] => Ok(0),
                _ => Err(ChunkedError::MissingChunkDelimiter),
            },
            DecodeState::Trailers => {
                let (consumed, done) = self.trailers.parse_line(data)?;
                if done {
                    trace!(trailers = self.trailers.len(), "chunked body complete");
                    self.state = DecodeState::Done;
                }
                Ok(consumed)
            }
            DecodeState::Done => Err(ChunkedError::DecoderAlreadyComplete),
        }
    }

    /// Returns `true` once the terminating chunk and trailer section were read.
    pub fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    /// Returns the payload decoded so far.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the trailers read after the last chunk.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }
}

/// Parses `<hex>[;extension]` and returns the chunk size.
fn parse_size_line(line: &[u8]) -> Result<u64, ChunkedError> {
    let invalid = || ChunkedError::InvalidChunkSize(String::from_utf8_lossy(line).into_owned());

    let digits = line.split(|&b| b == b';').next().unwrap_or_default();
    let digits = std::str::from_utf8(digits)
        .map_err(|_| invalid())?
        .trim_matches([' ', '\t']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u64::from_str_radix(digits, 16).map_err(|_| invalid())
}
