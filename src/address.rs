use std::{
    fmt::{self, Formatter},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    Ipv4,
    Ipv6,
    DomainName,
}

/// Strict IPv4 first, then IPv6. Anything else is taken as a domain name and
/// left for the proxy to resolve.
pub fn classify_address(text: &str) -> AddrKind {
    if text.parse::<Ipv4Addr>().is_ok() {
        AddrKind::Ipv4
    } else if text.parse::<Ipv6Addr>().is_ok() {
        AddrKind::Ipv6
    } else {
        AddrKind::DomainName
    }
}

/// Destination of a request, as the proxy is asked to reach it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Address {
    SocketAddress(SocketAddr),
    DomainNameAddress(String, u16), // domain name, port
}

impl Address {
    pub fn new(host: &str, port: u16) -> Address {
        match host.parse::<IpAddr>() {
            Ok(ip) => Address::SocketAddress(SocketAddr::new(ip, port)),
            Err(_) => Address::DomainNameAddress(host.to_owned(), port),
        }
    }

    pub fn kind(&self) -> AddrKind {
        match *self {
            Address::SocketAddress(SocketAddr::V4(..)) => AddrKind::Ipv4,
            Address::SocketAddress(SocketAddr::V6(..)) => AddrKind::Ipv6,
            Address::DomainNameAddress(..) => AddrKind::DomainName,
        }
    }

    pub fn port(&self) -> u16 {
        match *self {
            Address::SocketAddress(addr) => addr.port(),
            Address::DomainNameAddress(.., port) => port,
        }
    }

    pub fn host(&self) -> String {
        match *self {
            Address::SocketAddress(ref addr) => addr.ip().to_string(),
            Address::DomainNameAddress(ref domain, ..) => domain.to_owned(),
        }
    }

    /// Host as it goes into a `Host:` header; IPv6 literals are bracketed.
    pub fn host_for_header(&self) -> String {
        match *self {
            Address::SocketAddress(SocketAddr::V6(ref addr)) => format!("[{}]", addr.ip()),
            _ => self.host(),
        }
    }
}

impl fmt::Display for Address {
    #[inline]
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Address::SocketAddress(ref addr) => write!(f, "{}", addr),
            Address::DomainNameAddress(ref addr, ref port) => write!(f, "{}:{}", addr, port),
        }
    }
}
