//! Protocol constants and the crate error type
//!
//! Client sends SOCKS4 CONNECT request to the proxy:
//! ```txt
//! +----+----+---------+--------+----------+-------+----------+-------+
//! | VN | CD | DSTPORT | DSTIP  |  USERID  | NULL  |  DOMAIN  | NULL  |
//! +----+----+---------+--------+----------+-------+----------+-------+
//! | 1  | 1  |    2    |   4    | Variable |   1   | Variable |   1   |
//! +----+----+---------+--------+----------+-------+----------+-------+
//!
//! DOMAIN and its NULL are only present when DSTIP is 0.0.0.1 (SOCKS4a)
//!
//! example: connect example.com:80 with user id `torilate`
//! bytes: `0x04 0x01 0x00 0x50 0x00 0x00 0x00 0x01 b`torilate` 0x00 b`example.com` 0x00`
//! ```
//!
//! Proxy replies with exactly 8 bytes:
//! ```txt
//! +----+----+----------+
//! | VN | CD | IGNORED  |
//! +----+----+----------+
//! | 1  | 1  |    6     |
//! +----+----+----------+
//! ```

use std::{
    fmt, io,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

pub const SOCKS4_VERSION: u8 = 0x04;
pub const SOCKS4_CMD_CONNECT: u8 = 0x01;
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;
pub const SOCKS4_REPLY_LEN: usize = 8;

pub const SOCKS4_REQUEST_GRANTED: u8 = 90;
pub const SOCKS4_REQUEST_REJECTED: u8 = 91;
pub const SOCKS4_REQUEST_NO_IDENTD: u8 = 92;
pub const SOCKS4_REQUEST_IDENTD_MISMATCH: u8 = 93;

/// DSTIP value telling a SOCKS4a proxy that a domain name follows the user id
pub const SOCKS4A_DOMAIN_SENTINEL: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);

pub const TOR_PROXY_ADDR: Ipv4Addr = Ipv4Addr::LOCALHOST;
pub const TOR_PROXY_PORT: u16 = 9050;
pub const DEFAULT_USER_ID: &str = "torilate";

pub const USER_AGENT: &str = "Torilate";
pub const HTTP_DEFAULT_PORT: u16 = 80;
pub const HTTPS_DEFAULT_PORT: u16 = 443;
/// Response buffer size, including the trailing NUL. At most `HTTP_MAX_RESPONSE - 1` bytes are kept.
pub const HTTP_MAX_RESPONSE: usize = 8192;
pub const DEFAULT_MAX_REDIRECTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAddress,
    SocketCreate,
    Connect,
    NetworkIo,
    Protocol,
    ConnectionRejected,
    InvalidHeader,
    MalformedResponse,
    RedirectFailed,
    RedirectLimitExceeded,
    InvalidUri,
    FileNotFound,
    PermissionDenied,
    OutOfMemory,
    Io,
}

impl ErrorKind {
    pub fn base_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAddress => "Invalid network address",
            ErrorKind::SocketCreate => "Failed to create socket",
            ErrorKind::Connect => "Failed to connect to host",
            ErrorKind::NetworkIo => "Network I/O error",
            ErrorKind::Protocol => "SOCKS4 protocol error",
            ErrorKind::ConnectionRejected => "SOCKS4 request rejected",
            ErrorKind::InvalidHeader => "Invalid HTTP header",
            ErrorKind::MalformedResponse => "Bad or malformed response",
            ErrorKind::RedirectFailed => "Failed to follow HTTP redirect",
            ErrorKind::RedirectLimitExceeded => "Exceeded maximum HTTP redirects",
            ErrorKind::InvalidUri => "Invalid URL",
            ErrorKind::FileNotFound => "File not found",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::OutOfMemory => "Out of memory",
            ErrorKind::Io => "I/O error",
        }
    }

    /// Process exit status reported by the command line tool.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NetworkIo => 4,
            ErrorKind::InvalidAddress => 5,
            ErrorKind::Connect | ErrorKind::Protocol | ErrorKind::ConnectionRejected => 8,
            ErrorKind::SocketCreate => 10,
            ErrorKind::InvalidUri => 12,
            ErrorKind::MalformedResponse => 13,
            ErrorKind::InvalidHeader => 15,
            ErrorKind::RedirectLimitExceeded => 17,
            ErrorKind::RedirectFailed => 18,
            ErrorKind::Io => 19,
            ErrorKind::OutOfMemory => 20,
            ErrorKind::PermissionDenied => 21,
            ErrorKind::FileNotFound => 22,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse IP address '{0}'")]
    InvalidAddress(String),
    #[error("socket creation failed: {0}")]
    SocketCreate(#[source] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("send failed after {sent}/{total} bytes: {source}")]
    Send {
        sent: usize,
        total: usize,
        #[source]
        source: io::Error,
    },
    #[error("recv failed: {0}")]
    Recv(#[source] io::Error),
    #[error("truncated socks4 reply, got {0} of 8 bytes")]
    Socks4Truncated(usize),
    #[error("malformed socks4 reply, version byte {0:#04x}")]
    Socks4Malformed(u8),
    #[error("unknown socks4 status {0}")]
    Socks4UnknownStatus(u8),
    #[error("socks4 request for {destination} rejected with code {code}: {reason}")]
    ConnectionRejected {
        code: u8,
        reason: &'static str,
        destination: String,
    },
    #[error("header {0:?} is empty or contains an embedded CR or LF")]
    InvalidHeader(String),
    #[error("unable to parse status line")]
    MalformedResponse,
    #[error("{0}")]
    RedirectFailed(String),
    #[error("exceeded maximum redirect limit of {0}")]
    RedirectLimitExceeded(usize),
    #[error("invalid uri '{0}'")]
    InvalidUri(String),
    #[error("{}", .0.display())]
    FileNotFound(PathBuf),
    #[error("{}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Kind of the innermost cause, looking through any added context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddress(..) => ErrorKind::InvalidAddress,
            Error::SocketCreate(..) => ErrorKind::SocketCreate,
            Error::Connect { .. } => ErrorKind::Connect,
            Error::Send { .. } | Error::Recv(..) => ErrorKind::NetworkIo,
            Error::Socks4Truncated(..)
            | Error::Socks4Malformed(..)
            | Error::Socks4UnknownStatus(..) => ErrorKind::Protocol,
            Error::ConnectionRejected { .. } => ErrorKind::ConnectionRejected,
            Error::InvalidHeader(..) => ErrorKind::InvalidHeader,
            Error::MalformedResponse => ErrorKind::MalformedResponse,
            Error::RedirectFailed(..) => ErrorKind::RedirectFailed,
            Error::RedirectLimitExceeded(..) => ErrorKind::RedirectLimitExceeded,
            Error::InvalidUri(..) => ErrorKind::InvalidUri,
            Error::FileNotFound(..) => ErrorKind::FileNotFound,
            Error::PermissionDenied(..) => ErrorKind::PermissionDenied,
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::Io(..) => ErrorKind::Io,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with all context stripped.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root_cause(),
            e => e,
        }
    }

    /// Outermost segment only. `Display` renders the whole chain.
    pub fn summary(&self) -> String {
        match self {
            Error::Context { context, .. } => context.clone(),
            e => e.to_string(),
        }
    }

    pub fn context<C: fmt::Display>(self, context: C) -> Error {
        Error::Context {
            context: context.to_string(),
            source: Box::new(self),
        }
    }
}

pub trait ResultExt<T> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T, Error>;

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T, Error> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_innermost_kind() {
        let err: Result<(), Error> = Err(Error::Socks4Truncated(3));
        let err = err
            .context("SOCKS4 connection to example.com:80 failed")
            .context("Failed to get HTTP response from example.com:80")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(err.root_cause(), Error::Socks4Truncated(3)));
        assert_eq!(
            err.summary(),
            "Failed to get HTTP response from example.com:80"
        );
        assert_eq!(
            err.to_string(),
            "Failed to get HTTP response from example.com:80: \
             SOCKS4 connection to example.com:80 failed: \
             truncated socks4 reply, got 3 of 8 bytes"
        );
    }

    #[test]
    fn summary_without_context_is_the_error_itself() {
        let err = Error::RedirectLimitExceeded(5);
        assert_eq!(err.summary(), "exceeded maximum redirect limit of 5");
        assert_eq!(err.kind().exit_code(), 17);
    }

    #[test]
    fn io_errors_convert() {
        let err: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::Other, "boom"));
        let err = err.with_context(|| format!("writing {}", "out.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "writing out.txt: boom");
    }
}
