//! SOCKS4 CONNECT with the SOCKS4a domain extension.
//!
//! <https://www.openssh.com/txt/socks4.protocol>
//! <https://www.openssh.com/txt/socks4a.protocol>

use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr},
};

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::{consts::*, net::Tunnel, Address, Error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    pub port: u16,
    pub ip: Ipv4Addr,
    pub user_id: String,
    /// Present whenever `ip` is the SOCKS4a sentinel.
    pub domain: Option<String>,
}

impl Socks4Request {
    /// IPv4 literals go in DSTIP. Names and IPv6 literals use the sentinel
    /// and travel as text after the user id.
    pub fn connect(destination: &Address, user_id: &str) -> Socks4Request {
        let (ip, domain) = match *destination {
            Address::SocketAddress(SocketAddr::V4(ref addr)) => (*addr.ip(), None),
            _ => (SOCKS4A_DOMAIN_SENTINEL, Some(destination.host())),
        };
        Socks4Request {
            port: destination.port(),
            ip,
            user_id: user_id.to_owned(),
            domain,
        }
    }

    pub fn serialized_len(&self) -> usize {
        8 + self.user_id.len() + 1 + self.domain.as_ref().map_or(0, |d| d.len() + 1)
    }

    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(SOCKS4_VERSION);
        buf.put_u8(SOCKS4_CMD_CONNECT);
        buf.put_u16(self.port);
        buf.put_u32(u32::from(self.ip));
        buf.put_slice(self.user_id.as_bytes());
        buf.put_u8(0);
        if let Some(ref domain) = self.domain {
            buf.put_slice(domain.as_bytes());
            buf.put_u8(0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Reply {
    Granted,
    Rejected,
    IdentdUnreachable,
    IdentdMismatch,
}

impl Socks4Reply {
    pub fn parse(bytes: &[u8; SOCKS4_REPLY_LEN]) -> Result<Socks4Reply, Error> {
        if bytes[0] != SOCKS4_REPLY_VERSION {
            return Err(Error::Socks4Malformed(bytes[0]));
        }
        match bytes[1] {
            SOCKS4_REQUEST_GRANTED => Ok(Socks4Reply::Granted),
            SOCKS4_REQUEST_REJECTED => Ok(Socks4Reply::Rejected),
            SOCKS4_REQUEST_NO_IDENTD => Ok(Socks4Reply::IdentdUnreachable),
            SOCKS4_REQUEST_IDENTD_MISMATCH => Ok(Socks4Reply::IdentdMismatch),
            code => Err(Error::Socks4UnknownStatus(code)),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Socks4Reply::Granted => SOCKS4_REQUEST_GRANTED,
            Socks4Reply::Rejected => SOCKS4_REQUEST_REJECTED,
            Socks4Reply::IdentdUnreachable => SOCKS4_REQUEST_NO_IDENTD,
            Socks4Reply::IdentdMismatch => SOCKS4_REQUEST_IDENTD_MISMATCH,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Socks4Reply::Granted => "request granted",
            Socks4Reply::Rejected => "request rejected or failed",
            Socks4Reply::IdentdUnreachable => "proxy cannot connect to identd on the client",
            Socks4Reply::IdentdMismatch => "client and identd report different user ids",
        }
    }
}

/// Asks the proxy on the other end of `tunnel` to open a stream to
/// `destination`. A single attempt; any failure is final for this tunnel.
pub fn connect_through_proxy<S: Read + Write>(
    tunnel: &mut Tunnel<S>,
    destination: &Address,
    user_id: &str,
) -> Result<(), Error> {
    let req = Socks4Request::connect(destination, user_id);
    let mut buf = BytesMut::with_capacity(req.serialized_len());
    req.write_to_buf(&mut buf);
    trace!("socks4 request for {}: {} bytes", destination, buf.len());

    tunnel.send_all(&buf)?;

    let mut reply = [0u8; SOCKS4_REPLY_LEN];
    let mut filled = 0;
    while filled < SOCKS4_REPLY_LEN {
        let n = tunnel.recv_once(&mut reply[filled..])?;
        if n == 0 {
            return Err(Error::Socks4Truncated(filled));
        }
        filled += n;
    }

    match Socks4Reply::parse(&reply)? {
        Socks4Reply::Granted => {
            debug!("socks4 request granted, connected to {}", destination);
            Ok(())
        }
        rejected => Err(Error::ConnectionRejected {
            code: rejected.code(),
            reason: rejected.reason(),
            destination: destination.to_string(),
        }),
    }
}
