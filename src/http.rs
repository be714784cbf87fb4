//! Minimal HTTP/1.1 over an established tunnel: one request, `Connection: close`,
//! and a response read into a fixed-size buffer.

use std::{
    borrow::Cow,
    fmt::{self, Formatter},
    io::{Read, Write},
};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::{consts::*, net::Tunnel, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub host: String,
    pub port: u16,
    /// Caller supplied header lines, sent in order after `User-Agent`.
    pub headers: Vec<String>,
    /// Ignored for GET.
    pub body: Bytes,
}

/// Trims surrounding whitespace and line endings. Whatever CR or LF is left
/// inside would split the request, so the header is refused.
pub fn normalize_header(header: &str) -> Result<&str, Error> {
    let trimmed = header.trim();
    if trimmed.is_empty() || trimmed.contains(|c: char| c == '\r' || c == '\n') {
        return Err(Error::InvalidHeader(header.to_owned()));
    }
    Ok(trimmed)
}

/// Serializes the request. Every extra header is validated before anything
/// is written, so a rejected header never reaches the wire.
pub fn build_request(req: &HttpRequest) -> Result<BytesMut, Error> {
    let headers = req
        .headers
        .iter()
        .map(|h| normalize_header(h))
        .collect::<Result<Vec<_>, _>>()?;

    let body: &[u8] = match req.method {
        Method::Get => &[],
        Method::Post => &req.body,
    };

    let mut buf = BytesMut::with_capacity(256 + body.len());
    put_line(&mut buf, &format!("{} {} HTTP/1.1", req.method, req.path));
    if req.port == HTTP_DEFAULT_PORT {
        put_line(&mut buf, &format!("Host: {}", req.host));
    } else {
        put_line(&mut buf, &format!("Host: {}:{}", req.host, req.port));
    }
    put_line(&mut buf, &format!("User-Agent: {}", USER_AGENT));
    for header in headers {
        put_line(&mut buf, header);
    }
    if req.method == Method::Post {
        put_line(&mut buf, &format!("Content-Length: {}", body.len()));
    }
    put_line(&mut buf, "Connection: close");
    buf.put_slice(b"\r\n");
    buf.put_slice(body);

    Ok(buf)
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(b"\r\n");
}

/// A response held in a fixed buffer. The data is always followed by a NUL
/// inside the buffer, so at most `capacity - 1` bytes are kept.
pub struct HttpResponse {
    status_code: u16,
    raw: Box<[u8]>,
    len: usize,
    truncated: bool,
}

impl HttpResponse {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn bytes_received(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.raw.len()
    }

    /// The peer sent more than fits in the buffer; the rest was dropped. A
    /// response of exactly `capacity - 1` bytes followed by a close is complete.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Received bytes, verbatim.
    pub fn raw(&self) -> &[u8] {
        &self.raw[..self.len]
    }

    /// Received bytes plus the terminating NUL.
    pub fn raw_with_nul(&self) -> &[u8] {
        &self.raw[..=self.len]
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.raw())
    }

    /// Status line and headers, without the blank line.
    pub fn head(&self) -> &[u8] {
        match find(self.raw(), b"\r\n\r\n") {
            Some(end) => &self.raw[..end],
            None => self.raw(),
        }
    }

    /// Everything after the first blank line; empty when there is none.
    pub fn body(&self) -> &[u8] {
        match find(self.raw(), b"\r\n\r\n") {
            Some(end) => &self.raw[end + 4..self.len],
            None => &[],
        }
    }

    /// Header lines after the status line, as `(name, value)`.
    pub fn headers(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        self.head()
            .split(|&b| b == b'\n')
            .skip(1)
            .filter_map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let colon = line.iter().position(|&b| b == b':')?;
                let name = String::from_utf8_lossy(&line[..colon]);
                let value = String::from_utf8_lossy(trim_bytes(&line[colon + 1..]));
                Some((name, value))
            })
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status_code", &self.status_code)
            .field("bytes_received", &self.len)
            .field("capacity", &self.raw.len())
            .field("truncated", &self.truncated)
            .finish()
    }
}

/// Reads until the peer closes or the buffer is full, then parses the status line.
///
/// `capacity` counts the terminating NUL and is raised to 2 when smaller, so
/// at least one data byte fits.
pub fn read_response<S: Read + Write>(
    tunnel: &mut Tunnel<S>,
    capacity: usize,
) -> Result<HttpResponse, Error> {
    let capacity = capacity.max(2);
    let limit = capacity - 1;
    let mut raw = vec![0u8; capacity].into_boxed_slice();

    let mut total = 0;
    while total < limit {
        let n = tunnel.recv_once(&mut raw[total..limit])?;
        if n == 0 {
            break;
        }
        total += n;
        trace!("received {} bytes, {} total", n, total);
    }
    raw[total] = 0;

    // a full buffer is only truncation if the peer has more to say
    let truncated = total == limit && {
        let mut extra = [0u8; 1];
        match tunnel.recv_once(&mut extra) {
            Ok(n) => n > 0,
            Err(e) => {
                debug!("read past full buffer failed: {}", e);
                true
            }
        }
    };

    let status_code = parse_status_line(&raw[..total])?;
    let response = HttpResponse {
        status_code,
        raw,
        len: total,
        truncated,
    };
    if response.is_truncated() {
        warn!(
            "response did not fit the {} byte buffer and was truncated",
            capacity
        );
    }
    Ok(response)
}

/// `HTTP/<major>.<minor> <code>` after optional leading whitespace, with the
/// code in 100..=599.
pub fn parse_status_line(raw: &[u8]) -> Result<u16, Error> {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let rest = raw[start..]
        .strip_prefix(b"HTTP/")
        .ok_or(Error::MalformedResponse)?;

    let (major, rest) = split_digits(rest);
    let rest = rest.strip_prefix(b".").ok_or(Error::MalformedResponse)?;
    let (minor, rest) = split_digits(rest);
    if major.is_empty() || minor.is_empty() {
        return Err(Error::MalformedResponse);
    }

    let spaces = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    if spaces == 0 {
        return Err(Error::MalformedResponse);
    }
    let (code, _) = split_digits(&rest[spaces..]);
    if code.len() != 3 {
        return Err(Error::MalformedResponse);
    }
    let code = code
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    if !(100..=599).contains(&code) {
        return Err(Error::MalformedResponse);
    }
    Ok(code)
}

fn trim_bytes(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(s.len());
    let end = s.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &s[start..end]
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let n = s.iter().take_while(|b| b.is_ascii_digit()).count();
    s.split_at(n)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Sends one request over `tunnel` and reads the whole response.
pub fn send_request<S: Read + Write>(
    tunnel: &mut Tunnel<S>,
    req: &HttpRequest,
    capacity: usize,
) -> Result<HttpResponse, Error> {
    let buf = build_request(req)?;
    debug!("{} {} to {}:{}", req.method, req.path, req.host, req.port);
    tunnel.send_all(&buf)?;

    let response = read_response(tunnel, capacity)?;
    debug!(
        "HTTP {} with {} bytes from {}:{}",
        response.status_code(),
        response.bytes_received(),
        req.host,
        req.port
    );
    Ok(response)
}
