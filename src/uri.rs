use std::fmt::{self, Formatter};

use crate::{consts::*, Address, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => HTTP_DEFAULT_PORT,
            Scheme::Https => HTTPS_DEFAULT_PORT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Where a request goes: scheme, destination and request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub address: Address,
    pub path: String,
}

impl Target {
    /// Same scheme, host and port with a different path.
    pub fn with_path(&self, path: &str) -> Target {
        Target {
            scheme: self.scheme,
            address: self.address.clone(),
            path: path.to_owned(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.address.host_for_header(),
            self.address.port(),
            self.path
        )
    }
}

/// Splits `uri` into scheme, host, port and path.
///
/// A missing scheme means `http`, a missing port is the scheme's default and a
/// missing path is `/`. Fragments are never sent. Any scheme other than
/// `http` or `https` is rejected.
pub fn resolve(uri: &str) -> Result<Target, Error> {
    let uri = uri.trim();
    let invalid = || Error::InvalidUri(uri.to_owned());

    let (scheme, rest) = match uri.find("://") {
        Some(i) => {
            let scheme = match &uri[..i] {
                s if s.eq_ignore_ascii_case("http") => Scheme::Http,
                s if s.eq_ignore_ascii_case("https") => Scheme::Https,
                _ => return Err(invalid()),
            };
            (scheme, &uri[i + 3..])
        }
        None => (Scheme::Http, uri),
    };

    let authority_end = rest
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    let path = match path.find('#') {
        Some(i) => &path[..i],
        None => path,
    };
    let path = if path.is_empty() {
        "/".to_owned()
    } else if path.starts_with('?') {
        format!("/{}", path)
    } else {
        path.to_owned()
    };

    let authority = match authority.rfind('@') {
        Some(i) => &authority[i + 1..],
        None => authority,
    };

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let end = bracketed.find(']').ok_or_else(invalid)?;
        let host = &bracketed[..end];
        let port = match &bracketed[end + 1..] {
            "" => None,
            p => Some(p.strip_prefix(':').ok_or_else(invalid)?),
        };
        (host, port)
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() || has_unsafe_bytes(host) || has_unsafe_bytes(&path) {
        return Err(invalid());
    }
    let port = match port {
        Some(p) => match p.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(invalid()),
        },
        None => scheme.default_port(),
    };

    Ok(Target {
        scheme,
        address: Address::new(host, port),
        path,
    })
}

/// Both end up verbatim in the request line, `Host:` or the SOCKS4a name.
fn has_unsafe_bytes(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_control() || b == b' ')
}
