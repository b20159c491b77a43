//! RESP framing.
//!
//! Requests are arrays of bulk strings. `RequestParser` consumes them from a
//! `BytesMut` element by element and keeps its place between reads, so a
//! frame split over many reads is scanned once. Replies from a master are
//! parsed from a byte slice that may hold a partial reply; those functions
//! return `Ok(None)` until a whole reply is available and report how many
//! bytes it occupied.

use std::fmt;

use bytes::{Buf, BytesMut};

use crate::error::RespError;

/// Largest bulk string accepted from a peer.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header line (`*<count>`, `$<len>`, a simple reply) before its CRLF.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Most elements accepted in one request array.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// One parsed client request.
///
/// Arguments must be valid UTF-8; anything else is a parse error rather than
/// being replaced, so a stored value is always what the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Lowercased, trimmed command name.
    pub command: String,
    /// Everything after the command name, in order.
    pub args: Vec<String>,
}

/// A reply read back from a peer, used on the replica side of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(String),
    Null,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "+{}", s),
            Reply::Error(s) => write!(f, "-{}", s),
            Reply::Integer(n) => write!(f, ":{}", n),
            Reply::Bulk(s) => write!(f, "${} {:?}", s.len(), s),
            Reply::Null => write!(f, "(nil)"),
        }
    }
}

/// Number of leading ASCII whitespace bytes (stray CRLFs between frames).
pub fn leading_whitespace(buf: &[u8]) -> usize {
    buf.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

/// Finds the CRLF closing the line that begins at `start`, searching from
/// `from` onwards. Returns the offset of its CR.
fn find_crlf(buf: &[u8], start: usize, from: usize) -> Result<Option<usize>, RespError> {
    let rest = buf.get(from..).unwrap_or_default();
    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(idx) if from + idx - start <= MAX_LINE_LEN => Ok(Some(from + idx)),
        Some(_) => Err(RespError::LineTooLong),
        None if buf.len().saturating_sub(start) >= MAX_LINE_LEN + 2 => {
            Err(RespError::LineTooLong)
        }
        None => Ok(None),
    }
}

/// Returns the line starting at `start` (without CRLF) and the offset just
/// past its CRLF.
fn read_line(buf: &[u8], start: usize) -> Result<Option<(&[u8], usize)>, RespError> {
    Ok(find_crlf(buf, start, start)?.map(|end| (&buf[start..end], end + 2)))
}

fn first_char(line: &[u8]) -> char {
    line.first().map_or('?', |b| *b as char)
}

fn parse_header(line: &[u8], prefix: u8) -> Result<usize, RespError> {
    if line.first() != Some(&prefix) {
        return Err(RespError::UnexpectedPrefix {
            expected: prefix as char,
            found: first_char(line),
        });
    }
    let digits = &line[1..];
    let invalid = || RespError::InvalidLength(String::from_utf8_lossy(digits).into_owned());
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// Reads a `$<len>\r\n<payload>\r\n` element starting at `start`.
fn read_bulk(buf: &[u8], start: usize) -> Result<Option<(&[u8], usize)>, RespError> {
    let Some((header, next)) = read_line(buf, start)? else {
        return Ok(None);
    };
    let len = parse_header(header, b'$')?;
    if len > MAX_BULK_LEN {
        return Err(RespError::TooLarge(len));
    }
    let end = next + len;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(RespError::MissingTerminator);
    }
    Ok(Some((&buf[next..end], end + 2)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for `*<count>`.
    Count,
    /// Waiting for the next `$<len>`.
    BulkLen,
    /// Waiting for a payload of this many bytes plus CRLF.
    Payload(usize),
}

/// Incremental request parser for one connection.
///
/// Complete header lines and payloads are split off the buffer as soon as
/// they arrive. Whatever is left is the unfinished tail of a frame, and the
/// parser remembers how far into it the CRLF search already went.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    remaining: usize,
    parts: Vec<String>,
    scanned: usize,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: State::Count,
            remaining: 0,
            parts: Vec::new(),
            scanned: 0,
        }
    }

    /// True between frames.
    pub fn is_idle(&self) -> bool {
        self.state == State::Count && self.scanned == 0
    }

    /// Splits the next header line off `buf`, or records how much was
    /// searched if its CRLF has not arrived yet.
    fn take_line(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, RespError> {
        // The last byte searched may be a CR whose LF just arrived.
        let from = self.scanned.saturating_sub(1);
        match find_crlf(buf, 0, from)? {
            Some(end) => {
                self.scanned = 0;
                let line = buf.split_to(end);
                buf.advance(2);
                Ok(Some(line))
            }
            None => {
                self.scanned = buf.len();
                Ok(None)
            }
        }
    }

    /// Consumes one request from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; whatever was already
    /// consumed is kept and the next call carries on from there.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Request>, RespError> {
        loop {
            match self.state {
                State::Count => {
                    if self.scanned == 0 {
                        let skip = leading_whitespace(buf);
                        buf.advance(skip);
                    }
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(None);
                    };
                    let count = parse_header(&line, b'*')?;
                    if count == 0 {
                        return Err(RespError::EmptyCommand);
                    }
                    if count > MAX_ARRAY_LEN {
                        return Err(RespError::TooManyArgs(count));
                    }
                    self.remaining = count;
                    self.parts = Vec::with_capacity(count.min(16));
                    self.state = State::BulkLen;
                }
                State::BulkLen => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(None);
                    };
                    let len = parse_header(&line, b'$')?;
                    if len > MAX_BULK_LEN {
                        return Err(RespError::TooLarge(len));
                    }
                    self.state = State::Payload(len);
                }
                State::Payload(len) => {
                    if buf.len() < len + 2 {
                        return Ok(None);
                    }
                    if &buf[len..len + 2] != b"\r\n" {
                        return Err(RespError::MissingTerminator);
                    }
                    let payload = buf.split_to(len);
                    buf.advance(2);
                    let part =
                        String::from_utf8(payload.to_vec()).map_err(|_| RespError::InvalidUtf8)?;
                    self.parts.push(part);
                    self.remaining -= 1;
                    if self.remaining > 0 {
                        self.state = State::BulkLen;
                        continue;
                    }
                    self.state = State::Count;
                    return into_request(std::mem::take(&mut self.parts)).map(Some);
                }
            }
        }
    }
}

fn into_request(parts: Vec<String>) -> Result<Request, RespError> {
    let mut parts = parts.into_iter();
    let command = parts
        .next()
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_default();
    if command.is_empty() {
        return Err(RespError::EmptyCommand);
    }
    Ok(Request {
        command,
        args: parts.collect(),
    })
}

/// Parses one reply from the front of `buf`.
pub fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>, RespError> {
    let Some((line, next)) = read_line(buf, 0)? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(line.get(1..).unwrap_or_default()).into_owned();
    let reply = match line.first() {
        Some(b'+') => Reply::Simple(text),
        Some(b'-') => Reply::Error(text),
        Some(b':') => Reply::Integer(
            text.trim()
                .parse()
                .map_err(|_| RespError::InvalidLength(text.clone()))?,
        ),
        Some(b'$') if text == "-1" => Reply::Null,
        Some(b'$') => {
            return Ok(read_bulk(buf, 0)?.map(|(payload, used)| {
                (
                    Reply::Bulk(String::from_utf8_lossy(payload).into_owned()),
                    used,
                )
            }))
        }
        _ => {
            return Err(RespError::UnexpectedPrefix {
                expected: '+',
                found: first_char(line),
            })
        }
    };
    Ok(Some((reply, next)))
}

/// Parses a raw bulk transfer: `$<len>\r\n` followed by exactly `len` bytes
/// and no trailing CRLF.
pub fn parse_bulk_transfer(buf: &[u8]) -> Result<Option<(&[u8], usize)>, RespError> {
    let Some((header, next)) = read_line(buf, 0)? else {
        return Ok(None);
    };
    let len = parse_header(header, b'$')?;
    if len > MAX_BULK_LEN {
        return Err(RespError::TooLarge(len));
    }
    if buf.len() < next + len {
        return Ok(None);
    }
    Ok(Some((&buf[next..next + len], next + len)))
}

pub fn encode_simple_string(s: &str) -> String {
    format!("+{}\r\n", s)
}

pub fn encode_bulk_string(s: &str) -> String {
    format!("${}\r\n{}\r\n", s.len(), s)
}

pub fn encode_null_bulk_string() -> String {
    "$-1\r\n".to_string()
}

pub fn encode_array<S: AsRef<str>>(items: &[S]) -> String {
    let mut result = format!("*{}\r\n", items.len());
    for item in items {
        result.push_str(&encode_bulk_string(item.as_ref()));
    }
    result
}

pub fn encode_error(msg: &str) -> String {
    format!("-ERR {}\r\n", msg)
}

/// Binary payload with a bulk length header and no trailing CRLF.
pub fn encode_bulk_transfer(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out
}
