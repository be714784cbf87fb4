//! One request through the proxy, optionally following redirects.
//!
//! Every hop opens a fresh tunnel, repeats the SOCKS4 handshake and sends a
//! new request. The previous tunnel is closed before the next one is opened.

use std::{
    net::{IpAddr, SocketAddr},
    str,
};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{
    consts::*,
    http::{self, find, HttpRequest, HttpResponse, Method},
    net::{Connector, TcpConnector},
    socks4,
    uri::{self, Scheme, Target},
    Error, ResultExt,
};

/// Everything that describes one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: Method,
    pub uri: String,
    /// Sent with POST only.
    pub body: Bytes,
    pub headers: Vec<String>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl RequestOptions {
    pub fn get(uri: impl Into<String>) -> RequestOptions {
        RequestOptions {
            method: Method::Get,
            uri: uri.into(),
            body: Bytes::new(),
            headers: Vec::new(),
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn post(uri: impl Into<String>, body: impl Into<Bytes>) -> RequestOptions {
        RequestOptions {
            method: Method::Post,
            body: body.into(),
            ..RequestOptions::get(uri)
        }
    }

    pub fn header(mut self, header: impl Into<String>) -> RequestOptions {
        self.headers.push(header.into());
        self
    }

    pub fn follow_redirects(mut self, max_redirects: usize) -> RequestOptions {
        self.follow_redirects = true;
        self.max_redirects = max_redirects;
        self
    }
}

pub struct Client<C = TcpConnector> {
    connector: C,
    proxy: SocketAddr,
    user_id: String,
    response_capacity: usize,
}

impl Client<TcpConnector> {
    /// Talks to the Tor SOCKS listener on 127.0.0.1:9050.
    pub fn new() -> Client<TcpConnector> {
        Client::with_connector(TcpConnector)
    }
}

impl Default for Client<TcpConnector> {
    fn default() -> Self {
        Client::new()
    }
}

impl<C: Connector> Client<C> {
    pub fn with_connector(connector: C) -> Client<C> {
        Client {
            connector,
            proxy: SocketAddr::new(IpAddr::V4(TOR_PROXY_ADDR), TOR_PROXY_PORT),
            user_id: DEFAULT_USER_ID.to_owned(),
            response_capacity: HTTP_MAX_RESPONSE,
        }
    }

    pub fn proxy(mut self, proxy: SocketAddr) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Size of the response buffer, terminator included. Values below 2 are
    /// raised to 2 when reading.
    pub fn response_capacity(mut self, capacity: usize) -> Self {
        self.response_capacity = capacity;
        self
    }

    pub fn perform(&self, opts: &RequestOptions) -> Result<HttpResponse, Error> {
        let mut target =
            uri::resolve(&opts.uri).with_context(|| format!("Failed to parse URI: {}", opts.uri))?;
        let mut method = opts.method;
        // checked before anything touches the network
        let headers = opts
            .headers
            .iter()
            .map(|h| http::normalize_header(h).map(|h| h.to_owned()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut response = self
            .exchange(&target, method, &headers, &opts.body)
            .with_context(|| format!("Failed to get HTTP response from {}", target.address))?;

        if !opts.follow_redirects {
            return Ok(response);
        }

        let mut hops = 0;
        while response.is_redirect() {
            if hops >= opts.max_redirects {
                return Err(Error::RedirectLimitExceeded(opts.max_redirects));
            }

            let location = find_location(&response)?;
            let status = response.status_code();
            method = next_method(method, status);
            target = next_target(&target, &location)?;
            debug!(
                "following {} redirect {} of {} to {} as {}",
                status,
                hops + 1,
                opts.max_redirects,
                target,
                method
            );

            response = self
                .exchange(&target, method, &headers, &opts.body)
                .with_context(|| format!("HTTP redirect failed to {}", target.address))?;
            hops += 1;
        }

        info!(
            "{} {} finished with {} after {} redirects",
            opts.method,
            opts.uri,
            response.status_code(),
            hops
        );
        Ok(response)
    }

    /// One hop: tunnel, handshake, request, response. The tunnel is closed
    /// when this returns, whichever way it returns.
    fn exchange(
        &self,
        target: &Target,
        method: Method,
        headers: &[String],
        body: &Bytes,
    ) -> Result<HttpResponse, Error> {
        if target.scheme == Scheme::Https {
            warn!("TLS is not supported, sending plain HTTP to {}", target);
        }

        let request = HttpRequest {
            method,
            path: target.path.clone(),
            host: target.address.host_for_header(),
            port: target.address.port(),
            headers: headers.to_vec(),
            body: match method {
                Method::Get => Bytes::new(),
                Method::Post => body.clone(),
            },
        };

        let proxy_ip = self.proxy.ip().to_string();
        let mut tunnel = self
            .connector
            .connect(&proxy_ip, self.proxy.port())
            .with_context(|| format!("Cannot connect to Tor at {}", self.proxy))?;

        socks4::connect_through_proxy(&mut tunnel, &target.address, &self.user_id)
            .with_context(|| format!("SOCKS4 connection to {} failed", target.address))?;

        http::send_request(&mut tunnel, &request, self.response_capacity)
    }
}

/// 301, 302 and 303 turn a POST into a GET; 307 and 308 keep the method.
pub fn next_method(method: Method, status: u16) -> Method {
    match (method, status) {
        (Method::Post, 301 | 302 | 303) => Method::Get,
        _ => method,
    }
}

/// Value of the first `Location` header after the status line.
pub fn find_location(response: &HttpResponse) -> Result<String, Error> {
    const NAME: &[u8] = b"Location:";

    let raw = response.raw();
    let missing = || Error::RedirectFailed("Redirect missing Location header".to_owned());

    let mut pos = find(raw, b"\r\n").ok_or_else(missing)? + 2;
    loop {
        let line = &raw[pos..];
        if line.starts_with(b"\r\n") {
            return Err(missing());
        }
        if line.len() >= NAME.len() && line[..NAME.len()].eq_ignore_ascii_case(NAME) {
            let value = &line[NAME.len()..];
            let start = value.iter().position(|&b| b != b' ').unwrap_or(value.len());
            let value = &value[start..];
            let end = find(value, b"\r\n").ok_or_else(|| {
                Error::RedirectFailed("Failed to extract Location header".to_owned())
            })?;
            let location = str::from_utf8(&value[..end])
                .map_err(|_| Error::RedirectFailed("Location header is not UTF-8".to_owned()))?
                .trim_end();
            if location.is_empty() {
                return Err(Error::RedirectFailed("Location header is empty".to_owned()));
            }
            // the value becomes a request line, a Host header and a SOCKS4a name
            if location.bytes().any(|b| b.is_ascii_control() || b == b' ') {
                return Err(Error::RedirectFailed(format!(
                    "Location header {:?} contains whitespace or control characters",
                    location
                )));
            }
            return Ok(location.to_owned());
        }
        pos += find(line, b"\r\n").ok_or_else(missing)? + 2;
    }
}

/// A leading `/` keeps scheme, host and port; a value with a scheme is
/// resolved from scratch. Anything else would need a relative join, which
/// is not attempted.
pub fn next_target(current: &Target, location: &str) -> Result<Target, Error> {
    if location.starts_with('/') {
        Ok(current.with_path(location))
    } else if location.contains("://") {
        uri::resolve(location)
            .with_context(|| format!("Failed to parse redirect URL: {}", location))
    } else {
        Err(Error::RedirectFailed(format!(
            "Unsupported relative Location '{}'",
            location
        )))
    }
}
