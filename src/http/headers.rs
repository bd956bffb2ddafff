//! HTTP header table with case-insensitive, folded multi-value entries.
//!
//! Names are stored in lowercase. Repeated names are folded into a single
//! entry whose value is the `", "` join of every occurrence (RFC 9110 §5.3).

use std::fmt;

use thiserror::Error;

const CRLF: &[u8] = b"\r\n";

/// Punctuation allowed in a header name besides ASCII letters and digits.
const TOKEN_PUNCTUATION: &[u8] = b"!#$%&'*+-.^_`|~";

/// Errors produced while parsing a single header line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),
}

/// A case-insensitive header table.
///
/// Each distinct name owns exactly one entry; iteration yields entries in the
/// order their names were first seen. Callers must not rely on that order
/// when emitting headers on the wire.
///
/// The table is owned by a single request or response and performs no
/// internal locking.
///
/// # Examples
///
/// ```
/// use httpwire::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.set("Content-Type", "text/html");
/// headers.set("X-Custom", "first");
/// headers.set("X-Custom", "second");
///
/// assert_eq!(headers.get("content-type"), Some("text/html"));
/// assert_eq!(headers.get("x-custom"), Some("first, second"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one header line from the front of `buf` and folds it into the table.
    ///
    /// Returns `(consumed, done)`:
    ///
    /// - `(0, false)`: no CRLF yet, the caller must supply more bytes.
    /// - `(2, true)`: an empty line, the header block is complete.
    /// - `(n, false)`: one header was stored; `n` includes the CRLF.
    ///
    /// # Errors
    ///
    /// - [`HeaderError::MalformedHeaderLine`]: the line has no `:`, or the
    ///   value is not valid UTF-8.
    /// - [`HeaderError::InvalidHeaderName`]: whitespace before the colon, or a
    ///   non-token character in the name.
    pub fn parse_line(&mut self, buf: &[u8]) -> Result<(usize, bool), HeaderError> {
        let Some(idx) = find_crlf(buf) else {
            return Ok((0, false));
        };
        if idx == 0 {
            return Ok((CRLF.len(), true));
        }

        let line = &buf[..idx];
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(HeaderError::MalformedHeaderLine(lossy(line)));
        };

        let raw_name = &line[..colon];
        if raw_name.last().is_some_and(|b| is_horizontal_ws(*b)) {
            return Err(HeaderError::InvalidHeaderName(lossy(raw_name)));
        }

        let name = trim_ws(raw_name);
        if name.is_empty() || !name.iter().copied().all(is_token_char) {
            return Err(HeaderError::InvalidHeaderName(lossy(raw_name)));
        }

        let Ok(value) = std::str::from_utf8(trim_ws(&line[colon + 1..])) else {
            return Err(HeaderError::MalformedHeaderLine(lossy(line)));
        };
        self.set(&lossy(name), value);

        Ok((idx + CRLF.len(), false))
    }

    /// Stores `value` under `name`, joining it onto an existing value with `", "`.
    pub fn set(&mut self, name: &str, value: &str) {
        let key = trim_str(name).to_ascii_lowercase();
        let value = trim_str(value);
        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.inner.push((key, value.to_owned())),
        }
    }

    /// Returns the value stored under `name` (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Stores `value` under `name`, discarding any previous value.
    pub fn replace(&mut self, name: &str, value: &str) {
        let key = trim_str(name).to_ascii_lowercase();
        let value = trim_str(value).to_owned();
        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.inner.push((key, value)),
        }
    }

    /// Removes the entry for `name` (case-insensitive).
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the table has an entry for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of distinct header names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

/// Returns the offset of the first CRLF in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || TOKEN_PUNCTUATION.contains(&b)
}

fn is_horizontal_ws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn trim_ws(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !is_horizontal_ws(*first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !is_horizontal_ws(*last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

fn trim_str(s: &str) -> &str {
    s.trim_matches([' ', '\t'])
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
