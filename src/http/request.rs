//! Completed HTTP/1.1 requests and the read loop that produces them.

use std::str::FromStr;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::parser::{ParseError, RequestParser};
use super::{Headers, Method};

/// Default starting size of the read buffer.
pub const DEFAULT_INITIAL_CAPACITY: usize = 8;

/// Default limit on bytes buffered without completing a token (64 KiB).
pub const DEFAULT_MAX_BUFFERED: usize = 64 * 1024;

/// Default limit on the start line plus header block (64 KiB).
pub const DEFAULT_MAX_HEAD: usize = 64 * 1024;

/// Default limit on a declared `Content-Length` (8 MiB).
pub const DEFAULT_MAX_BODY: usize = 8 * 1024 * 1024;

/// HTTP version. Only HTTP/1.1 is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http11,
}

impl Version {
    /// Returns the version number without the `HTTP/` prefix, e.g. `"1.1"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http11 => "1.1",
        }
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s.split_once('/') {
            Some(("HTTP", "1.1")) => Ok(Version::Http11),
            _ => Err(ParseError::UnsupportedVersion(s.to_owned())),
        }
    }
}

/// The first line of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: Version,
}

/// Buffer policy for [`Request::from_reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Capacity of the read buffer before the first read.
    pub initial_capacity: usize,
    /// Upper bound on unconsumed bytes held between reads.
    pub max_buffered: usize,
    /// Upper bound on the start line and header block, CRLFs included.
    pub max_head: usize,
    /// Largest `Content-Length` a request may declare.
    pub max_body: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_buffered: DEFAULT_MAX_BUFFERED,
            max_head: DEFAULT_MAX_HEAD,
            max_body: DEFAULT_MAX_BODY,
        }
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Produced by [`RequestParser::finish`] or [`Request::from_reader`] and
/// handed to a handler as a read-only value.
///
/// # Examples
///
/// ```
/// use httpwire::http::{Method, ReadOptions, Request};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut raw: &[u8] = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let request = Request::from_reader(&mut raw, &ReadOptions::default()).await.unwrap();
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    line: RequestLine,
    headers: Headers,
    body: Bytes,
}

impl Request {
    pub(crate) fn new(line: RequestLine, headers: Headers, body: Bytes) -> Self {
        Self {
            line,
            headers,
            body,
        }
    }

    /// Reads one request from `reader`.
    ///
    /// The buffer starts at `options.initial_capacity`, doubles whenever a
    /// read would find it full, and drops each prefix the parser consumes.
    /// Bytes left over after the request is complete are discarded.
    ///
    /// # Errors
    ///
    /// - [`ParseError::IncompleteRequest`]: the stream ended before the
    ///   request was complete; carries the parser state at that point.
    /// - [`ParseError::BufferLimitExceeded`]: more than `options.max_buffered`
    ///   bytes were pending without completing a line.
    /// - [`ParseError::HeadTooLarge`] / [`ParseError::PayloadTooLarge`]: the
    ///   request is larger than `options.max_head` / `options.max_body` allow.
    /// - [`ParseError::Io`]: the underlying read failed.
    /// - any parse error from [`RequestParser::feed`].
    pub async fn from_reader<R>(reader: &mut R, options: &ReadOptions) -> Result<Self, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        let mut parser = RequestParser::with_limits(options.max_head, options.max_body);
        let mut buf = BytesMut::with_capacity(options.initial_capacity.max(1));

        while !parser.is_done() {
            if buf.len() == buf.capacity() {
                let grow = buf.capacity().max(1);
                buf.reserve(grow);
                trace!(capacity = buf.capacity(), "grew read buffer");
            }

            let read = reader.read_buf(&mut buf).await?;
            if read == 0 {
                debug!(state = %parser.state(), buffered = buf.len(), "stream ended mid-request");
                return Err(ParseError::IncompleteRequest {
                    state: parser.state(),
                });
            }

            let consumed = parser.feed(&buf)?;
            buf.advance(consumed);

            if !parser.is_done() && buf.len() > options.max_buffered {
                return Err(ParseError::BufferLimitExceeded {
                    limit: options.max_buffered,
                });
            }
        }

        if !buf.is_empty() {
            trace!(discarded = buf.len(), "ignoring bytes after request");
        }
        parser.finish()
    }

    /// Returns the start line.
    pub fn request_line(&self) -> &RequestLine {
        &self.line
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.line.method
    }

    /// Returns the request target exactly as sent.
    pub fn target(&self) -> &str {
        &self.line.target
    }

    /// Returns the request path (the target without the query string).
    pub fn path(&self) -> &str {
        match self.line.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.line.target,
        }
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.line.target.split_once('?').map(|(_, query)| query)
    }

    /// Returns the protocol version.
    pub fn version(&self) -> Version {
        self.line.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;
    use crate::http::ParserState;

    /// Yields at most `chunk` bytes per read.
    struct ChunkReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkReader {
        fn new(data: &[u8], chunk: usize) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
                chunk,
            }
        }
    }

    impl AsyncRead for ChunkReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let end = (self.pos + self.chunk)
                .min(self.data.len())
                .min(self.pos + buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..end]);
            self.pos = end;
            Poll::Ready(Ok(()))
        }
    }

    const RAW: &[u8] = b"GET /coffee?size=large HTTP/1.1\r\n\
        Host: localhost:42069\r\n\
        User-Agent: curl/7.81.0\r\n\
        Accept: */*\r\n\
        \r\n";

    #[tokio::test]
    async fn reads_across_many_small_reads() {
        let mut reader = ChunkReader::new(RAW, RAW.len());
        let whole = Request::from_reader(&mut reader, &ReadOptions::default())
            .await
            .unwrap();
        for chunk in [1, 3, 8] {
            let mut reader = ChunkReader::new(RAW, chunk);
            let req = Request::from_reader(&mut reader, &ReadOptions::default())
                .await
                .unwrap();
            assert_eq!(req, whole, "chunk size {chunk}");
        }
        assert_eq!(whole.path(), "/coffee");
        assert_eq!(whole.query_string(), Some("size=large"));
        assert_eq!(whole.headers().get("user-agent"), Some("curl/7.81.0"));
    }

    #[tokio::test]
    async fn body_is_collected() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
        let mut reader = ChunkReader::new(raw, 4);
        let req = Request::from_reader(&mut reader, &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(req.content_length(), Some(11));
        assert_eq!(req.body().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn truncated_body_is_incomplete() {
        let mut raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc";
        let err = Request::from_reader(&mut raw, &ReadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::IncompleteRequest {
                state: ParserState::ParsingBody
            }
        ));
    }

    #[tokio::test]
    async fn truncated_headers_are_incomplete() {
        let mut raw: &[u8] = b"GET / HTTP/1.1\r\nHost: loc";
        let err = Request::from_reader(&mut raw, &ReadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::IncompleteRequest {
                state: ParserState::ParsingHeaders
            }
        ));
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 256));
        let options = ReadOptions {
            initial_capacity: 8,
            max_buffered: 64,
            ..ReadOptions::default()
        };
        let err = Request::from_reader(&mut raw.as_slice(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::BufferLimitExceeded { limit: 64 }));
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_rejected() {
        let mut raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 1025\r\n\r\n";
        let options = ReadOptions {
            max_body: 1024,
            ..ReadOptions::default()
        };
        let err = Request::from_reader(&mut raw, &options).await.unwrap_err();
        assert!(matches!(
            err,
            ParseError::PayloadTooLarge {
                declared: 1025,
                limit: 1024
            }
        ));
    }

    #[tokio::test]
    async fn endless_headers_are_cut_off() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..200 {
            raw.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaa\r\n");
        }
        let options = ReadOptions {
            max_head: 1024,
            ..ReadOptions::default()
        };
        let mut reader = ChunkReader::new(&raw, 64);
        let err = Request::from_reader(&mut reader, &options).await.unwrap_err();
        assert!(matches!(err, ParseError::HeadTooLarge { limit: 1024 }));
    }

    #[test]
    fn version_parsing() {
        assert_eq!("HTTP/1.1".parse::<Version>().unwrap(), Version::Http11);
        assert!("HTTP/1.0".parse::<Version>().is_err());
        assert!("http/1.1".parse::<Version>().is_err());
    }
}
