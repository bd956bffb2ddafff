//! Incremental HTTP/1.1 request parser.
//!
//! The parser never reads from a transport. A read loop owns the bytes and
//! calls [`RequestParser::feed`] with everything it has buffered so far; the
//! parser consumes as many complete tokens as it can and reports how many
//! bytes it used. Unconsumed bytes stay with the caller and are offered again,
//! together with newly read data, on the next call.
//!
//! ```text
//! Initial ──start line──▶ ParsingHeaders ──blank line──▶ ParsingBody ──N bytes──▶ Done
//!                                        └──────── no / zero Content-Length ─────▶ Done
//! ```

use std::fmt;

use bytes::BytesMut;
use thiserror::Error;
use tracing::trace;

use super::headers::{self, HeaderError, Headers};
use super::request::{DEFAULT_MAX_BODY, DEFAULT_MAX_HEAD, Request, RequestLine, Version};
use super::Method;

/// Errors produced while parsing a request.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed start line: {0:?}")]
    MalformedStartLine(String),

    #[error("invalid method: {0:?}")]
    InvalidMethod(String),

    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("malformed Content-Length: {0:?}")]
    MalformedContentLength(String),

    #[error("body exceeds declared Content-Length of {declared} bytes")]
    BodyOverflow { declared: usize },

    #[error("declared Content-Length of {declared} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { declared: usize, limit: usize },

    #[error("start line and headers exceed {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("stream ended before the request was complete (state: {state})")]
    IncompleteRequest { state: ParserState },

    #[error("buffered {limit} bytes without completing a line")]
    BufferLimitExceeded { limit: usize },

    #[error("parser already reached the done state")]
    ParserAlreadyComplete,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Position of a [`RequestParser`] within the request.
///
/// Transitions only move forward; `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Initial,
    ParsingHeaders,
    ParsingBody,
    Done,
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::ParsingHeaders => "parsing headers",
            Self::ParsingBody => "parsing body",
            Self::Done => "done",
        })
    }
}

/// Most body bytes reserved up front; the rest is allocated as it arrives.
const BODY_PREALLOC: usize = 16 * 1024;

// Outcome of a single transition attempt.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    // Not enough bytes for the current state; stop and wait for the next feed.
    NeedMore,
    Advance { consumed: usize, next: ParserState },
}

/// Incremental request parser.
///
/// One parser handles exactly one request and is owned by the task reading
/// its connection; it is not meant to be shared.
///
/// # Examples
///
/// ```
/// use httpwire::http::{ParserState, RequestParser};
///
/// let mut parser = RequestParser::new();
/// let consumed = parser.feed(b"GET / HTTP/1.1\r\nHo").unwrap();
/// assert_eq!(consumed, 16); // the start line only
/// assert_eq!(parser.state(), ParserState::ParsingHeaders);
///
/// let consumed = parser.feed(b"Host: x\r\n\r\n").unwrap();
/// assert_eq!(consumed, 11);
/// let request = parser.finish().unwrap();
/// assert_eq!(request.headers().get("host"), Some("x"));
/// ```
#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
    line: Option<RequestLine>,
    headers: Headers,
    body: BytesMut,
    content_length: usize,
    head_len: usize,
    max_head: usize,
    max_body: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser in the [`ParserState::Initial`] state with the
    /// default size limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_HEAD, DEFAULT_MAX_BODY)
    }

    /// Creates a parser that rejects a start line plus header block longer
    /// than `max_head` bytes, and a declared `Content-Length` above `max_body`.
    pub fn with_limits(max_head: usize, max_body: usize) -> Self {
        Self {
            state: ParserState::Initial,
            line: None,
            headers: Headers::new(),
            body: BytesMut::new(),
            content_length: 0,
            head_len: 0,
            max_head,
            max_body,
        }
    }

    /// Consumes as much of `buf` as forms complete tokens.
    ///
    /// Returns the number of bytes consumed. The caller must drop that prefix
    /// and pass the remainder, plus any newly read bytes, on the next call.
    /// Returning fewer bytes than `buf.len()` without reaching
    /// [`ParserState::Done`] means more data is needed.
    ///
    /// # Errors
    ///
    /// Any [`ParseError`] other than `IncompleteRequest`, `BufferLimitExceeded`
    /// and `Io`; the request must then be rejected. Calling `feed` after
    /// `Done` fails with [`ParseError::ParserAlreadyComplete`].
    pub fn feed(&mut self, buf: &[u8]) -> Result<usize, ParseError> {
        if self.state == ParserState::Done {
            return Err(ParseError::ParserAlreadyComplete);
        }

        let mut total = 0;
        while self.state != ParserState::Done {
            match self.step(&buf[total..])? {
                Step::NeedMore => break,
                Step::Advance { consumed, next } => {
                    if self.state != ParserState::ParsingBody {
                        self.head_len += consumed;
                        if self.head_len > self.max_head {
                            return Err(ParseError::HeadTooLarge {
                                limit: self.max_head,
                            });
                        }
                    }
                    if next != self.state {
                        trace!(from = %self.state, to = %next, "parser transition");
                    }
                    self.state = next;
                    total += consumed;
                }
            }
        }
        Ok(total)
    }

    /// Attempts one transition from the current state.
    fn step(&mut self, data: &[u8]) -> Result<Step, ParseError> {
        match self.state {
            ParserState::Initial => {
                let Some(idx) = headers::find_crlf(data) else {
                    return Ok(Step::NeedMore);
                };
                self.line = Some(parse_request_line(&data[..idx])?);
                Ok(Step::Advance {
                    consumed: idx + 2,
                    next: ParserState::ParsingHeaders,
                })
            }
            ParserState::ParsingHeaders => match self.headers.parse_line(data)? {
                (0, _) => Ok(Step::NeedMore),
                (consumed, false) => Ok(Step::Advance {
                    consumed,
                    next: ParserState::ParsingHeaders,
                }),
                (consumed, true) => Ok(Step::Advance {
                    consumed,
                    next: self.end_of_headers()?,
                }),
            },
            ParserState::ParsingBody => {
                if data.is_empty() {
                    return Ok(Step::NeedMore);
                }
                let remaining = self.content_length - self.body.len();
                if data.len() > remaining {
                    return Err(ParseError::BodyOverflow {
                        declared: self.content_length,
                    });
                }
                self.body.extend_from_slice(data);
                let next = if self.body.len() == self.content_length {
                    ParserState::Done
                } else {
                    ParserState::ParsingBody
                };
                Ok(Step::Advance {
                    consumed: data.len(),
                    next,
                })
            }
            ParserState::Done => Err(ParseError::ParserAlreadyComplete),
        }
    }

    /// Chooses the state after the blank line that ends the header block.
    fn end_of_headers(&mut self) -> Result<ParserState, ParseError> {
        let Some(raw) = self.headers.get("content-length") else {
            return Ok(ParserState::Done);
        };
        let length: usize = raw
            .parse()
            .map_err(|_| ParseError::MalformedContentLength(raw.to_owned()))?;
        if length > self.max_body {
            return Err(ParseError::PayloadTooLarge {
                declared: length,
                limit: self.max_body,
            });
        }
        self.content_length = length;
        self.body.reserve(length.min(BODY_PREALLOC));
        Ok(if length == 0 {
            ParserState::Done
        } else {
            ParserState::ParsingBody
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Returns `true` once the whole request has been parsed.
    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Returns the parsed start line, once available.
    pub fn request_line(&self) -> Option<&RequestLine> {
        self.line.as_ref()
    }

    /// Returns the headers parsed so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes accumulated so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts a finished parser into a [`Request`].
    ///
    /// # Errors
    ///
    /// [`ParseError::IncompleteRequest`] if the parser has not reached
    /// [`ParserState::Done`]; this is what a read loop reports when the
    /// stream ends early.
    pub fn finish(self) -> Result<Request, ParseError> {
        let state = self.state;
        match self.line {
            Some(line) if state == ParserState::Done => {
                Ok(Request::new(line, self.headers, self.body.freeze()))
            }
            _ => Err(ParseError::IncompleteRequest { state }),
        }
    }
}

/// Parses `<METHOD> <TARGET> HTTP/1.1` (without the CRLF).
fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| {
        ParseError::MalformedStartLine(String::from_utf8_lossy(line).into_owned())
    })?;

    let parts: Vec<&str> = text.split(' ').collect();
    let [method, target, version] = parts.as_slice() else {
        return Err(ParseError::MalformedStartLine(text.to_owned()));
    };
    if target.is_empty() {
        return Err(ParseError::MalformedStartLine(text.to_owned()));
    }

    let method: Method = method.parse()?;
    let version: Version = version.parse()?;

    Ok(RequestLine {
        method,
        target: (*target).to_owned(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_BODY: &[u8] = b"POST /submit HTTP/1.1\r\n\
        Host: localhost:42069\r\n\
        User-Agent: curl/7.81.0\r\n\
        Accept: */*\r\n\
        Accept: text/plain\r\n\
        Content-Length: 13\r\n\
        \r\n\
        hello world!\n";

    /// Mimics a read loop that receives `chunk` bytes per read.
    fn parse_in_chunks(data: &[u8], chunk: usize) -> Result<Request, ParseError> {
        let mut parser = RequestParser::new();
        let mut buf = Vec::new();
        for piece in data.chunks(chunk) {
            buf.extend_from_slice(piece);
            let consumed = parser.feed(&buf)?;
            buf.drain(..consumed);
            if parser.is_done() {
                break;
            }
        }
        parser.finish()
    }

    #[test]
    fn end_to_end_with_body() {
        let raw = b"GET /path HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nabcd";
        let mut parser = RequestParser::new();
        let consumed = parser.feed(raw).unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(parser.state(), ParserState::Done);

        let req = parser.finish().unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.target(), "/path");
        assert_eq!(req.version().as_str(), "1.1");
        assert_eq!(req.headers().get("host"), Some("x"));
        assert_eq!(req.body().as_ref(), b"abcd");
    }

    #[test]
    fn split_points_do_not_matter() {
        let whole = parse_in_chunks(WITH_BODY, WITH_BODY.len()).unwrap();
        for chunk in [1, 2, 3, 8, 17] {
            let split = parse_in_chunks(WITH_BODY, chunk).unwrap();
            assert_eq!(split, whole, "chunk size {chunk}");
        }
        assert_eq!(whole.headers().get("accept"), Some("*/*, text/plain"));
        assert_eq!(whole.body().as_ref(), b"hello world!\n");
    }

    #[test]
    fn partial_start_line_consumes_nothing() {
        let mut parser = RequestParser::new();
        assert_eq!(parser.feed(b"GET / HTT").unwrap(), 0);
        assert_eq!(parser.state(), ParserState::Initial);
    }

    #[test]
    fn repeated_headers_fold() {
        let mut parser = RequestParser::new();
        parser
            .feed(b"GET / HTTP/1.1\r\nA: 1\r\nA: 2\r\n\r\n")
            .unwrap();
        assert_eq!(parser.headers().get("a"), Some("1, 2"));
    }

    #[test]
    fn no_content_length_means_no_body() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let mut parser = RequestParser::new();
        assert_eq!(parser.feed(raw).unwrap(), raw.len());
        let req = parser.finish().unwrap();
        assert!(req.body().is_empty());
    }

    #[test]
    fn zero_content_length_is_done_after_headers() {
        let mut parser = RequestParser::new();
        parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        assert!(parser.is_done());
    }

    #[test]
    fn exact_body_reaches_done() {
        let mut parser = RequestParser::new();
        parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap();
        assert!(parser.is_done());
    }

    #[test]
    fn body_longer_than_declared_overflows() {
        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello!")
            .unwrap_err();
        assert!(matches!(err, ParseError::BodyOverflow { declared: 5 }));
    }

    #[test]
    fn short_body_is_incomplete() {
        let mut parser = RequestParser::new();
        parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel")
            .unwrap();
        assert_eq!(parser.state(), ParserState::ParsingBody);
        let err = parser.finish().unwrap_err();
        assert!(matches!(
            err,
            ParseError::IncompleteRequest {
                state: ParserState::ParsingBody
            }
        ));
    }

    #[test]
    fn malformed_content_length() {
        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: -3\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedContentLength(_)));
    }

    #[test]
    fn huge_content_length_is_rejected_without_allocating() {
        for declared in ["18446744073709551615", "100000000000000"] {
            let mut parser = RequestParser::new();
            let raw = format!("POST / HTTP/1.1\r\nContent-Length: {declared}\r\n\r\n");
            let err = parser.feed(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, ParseError::PayloadTooLarge { .. }), "{declared}");
        }
    }

    #[test]
    fn content_length_beyond_usize_is_malformed() {
        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedContentLength(_)));
    }

    #[test]
    fn body_limit_is_inclusive() {
        let mut parser = RequestParser::with_limits(DEFAULT_MAX_HEAD, 4);
        parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcd")
            .unwrap();
        assert!(parser.is_done());

        let mut parser = RequestParser::with_limits(DEFAULT_MAX_HEAD, 4);
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::PayloadTooLarge {
                declared: 5,
                limit: 4
            }
        ));
    }

    #[test]
    fn head_limit_counts_every_header_line() {
        let mut parser = RequestParser::with_limits(32, DEFAULT_MAX_BODY);
        assert_eq!(parser.feed(b"GET / HTTP/1.1\r\n").unwrap(), 16);
        let err = parser
            .feed(b"A: 1\r\nB: 2\r\nC: 3\r\nD: 4\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::HeadTooLarge { limit: 32 }));
    }

    #[test]
    fn start_line_needs_three_fields() {
        let mut parser = RequestParser::new();
        let err = parser.feed(b"/coffee HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedStartLine(_)));

        let mut parser = RequestParser::new();
        let err = parser.feed(b"GET  /coffee HTTP/1.1\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedStartLine(_)));
    }

    #[test]
    fn lowercase_method_is_rejected() {
        let mut parser = RequestParser::new();
        let err = parser.feed(b"get / HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidMethod(_)));
    }

    #[test]
    fn only_http_1_1_is_supported() {
        for version in ["HTTP/1.0", "HTTP/2.0", "HTTPS/1.1", "1.1"] {
            let mut parser = RequestParser::new();
            let raw = format!("GET / {version}\r\n\r\n");
            let err = parser.feed(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, ParseError::UnsupportedVersion(_)), "{version}");
        }
    }

    #[test]
    fn header_errors_propagate() {
        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"GET / HTTP/1.1\r\nFoo Bar: x\r\n\r\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Header(HeaderError::InvalidHeaderName(_))
        ));

        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"GET / HTTP/1.1\r\nno colon\r\n\r\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Header(HeaderError::MalformedHeaderLine(_))
        ));
    }

    #[test]
    fn non_utf8_header_value_is_rejected() {
        let mut parser = RequestParser::new();
        let err = parser
            .feed(b"GET / HTTP/1.1\r\nX-Name: caf\xe9\r\n\r\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Header(HeaderError::MalformedHeaderLine(_))
        ));
    }

    #[test]
    fn feeding_after_done_fails() {
        let mut parser = RequestParser::new();
        parser.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let err = parser.feed(b"more").unwrap_err();
        assert!(matches!(err, ParseError::ParserAlreadyComplete));
    }

    #[test]
    fn finish_before_start_line_is_incomplete() {
        let parser = RequestParser::new();
        assert!(matches!(
            parser.finish(),
            Err(ParseError::IncompleteRequest {
                state: ParserState::Initial
            })
        ));
    }
}
