//! HTTP/1.1 wire engine.
//!
//! - [`Headers`]: case-insensitive header table and header-line parser.
//! - [`RequestParser`]: incremental request state machine fed by a read loop.
//! - [`Request`]: the completed, read-only request.
//! - [`ResponseWriter`]: ordered status-line / headers / body / trailers serializer.
//! - [`chunked`]: chunked transfer-coding encoder and decoder.

use std::fmt;

pub mod chunked;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;

pub use headers::{HeaderError, Headers};
pub use parser::{ParseError, ParserState, RequestParser};
pub use request::{ReadOptions, Request, RequestLine, Version};
pub use response::{ResponseWriter, WriteError, WriterState, default_headers};

/// An HTTP response status code with a fixed reason phrase.
///
/// [`ResponseWriter::write_status_line`] also accepts a bare `u16`; codes not
/// listed here are written with an empty reason phrase.
///
/// # Examples
///
/// ```
/// use httpwire::http::StatusCode;
///
/// let status = StatusCode::Ok;
/// assert_eq!(status.as_u16(), 200);
/// assert_eq!(status.canonical_reason(), "OK");
/// assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
/// assert_eq!(StatusCode::from_u16(299), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    NoContent = 204,

    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    RequestHeaderFieldsTooLarge = 431,

    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the reason phrase written after the code on the status line.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::LengthRequired => "Length Required",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// Maps a numeric code to a known status, or `None` if it has no fixed reason.
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            200 => Self::Ok,
            201 => Self::Created,
            204 => Self::NoContent,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            411 => Self::LengthRequired,
            413 => Self::PayloadTooLarge,
            431 => Self::RequestHeaderFieldsTooLarge,
            500 => Self::InternalServerError,
            501 => Self::NotImplemented,
            502 => Self::BadGateway,
            505 => Self::HttpVersionNotSupported,
            _ => return None,
        })
    }
}

/// Returns the reason phrase for `code`, or `""` if the code is not known.
pub fn reason_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code).map_or("", StatusCode::canonical_reason)
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Only uppercase ASCII letters are accepted on the wire. Standard methods
/// get their own variant; any other uppercase token is kept in `Custom`.
///
/// # Examples
///
/// ```
/// use httpwire::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!("BREW".parse::<Method>().unwrap().as_str(), "BREW");
/// assert!("get".parse::<Method>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ParseError::InvalidMethod(s.to_owned()));
        }
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
