use std::{
    io::{self, Write},
    net::SocketAddr,
};

use bytes::Bytes;
use clap::ArgMatches;
use derivative::Derivative;
use tracing::{debug, info, warn};

use torilate::{util, Client, Error, HttpResponse, Method, RequestOptions, ResultExt};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Status and size, then the raw response.
    Summary,
    Raw,
    ContentOnly,
}

pub enum Body {
    Inline(Bytes),
    File(String),
}

/// One `get` or `post` invocation as given on the command line.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Invocation {
    pub method: Method,
    pub url: String,
    pub headers: Vec<String>,
    #[derivative(Debug = "ignore")]
    pub body: Option<Body>,
    pub output: Option<String>,
    pub follow: bool,
    pub max_redirects: Option<usize>,
    pub mode: OutputMode,
    pub verbose: bool,
}

impl Invocation {
    pub fn from_matches(name: &str, m: &ArgMatches) -> anyhow::Result<Invocation> {
        let method = match name {
            "get" => Method::Get,
            "post" => Method::Post,
            other => anyhow::bail!("unknown command {}", other),
        };

        let mut headers: Vec<String> = m
            .values_of("header")
            .map(|v| v.map(String::from).collect())
            .unwrap_or_default();

        let mut body = None;
        if method == Method::Post {
            if let Some(content_type) = m.value_of("content-type") {
                headers.push(format!("Content-Type: {}", content_type));
            }
            body = match (m.value_of("body"), m.value_of("input")) {
                (Some(text), _) => Some(Body::Inline(Bytes::copy_from_slice(text.as_bytes()))),
                (None, Some(file)) => Some(Body::File(file.into())),
                (None, None) => None,
            };
        }

        let max_redirects = match m.value_of("max-redirs") {
            Some(n) => Some(
                n.parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("invalid --max-redirs value {}", n))?,
            ),
            None => None,
        };

        let mode = if m.is_present("raw") {
            OutputMode::Raw
        } else if m.is_present("content-only") {
            OutputMode::ContentOnly
        } else {
            OutputMode::Summary
        };

        Ok(Invocation {
            method,
            url: m.value_of("url").unwrap_or_default().into(),
            headers,
            body,
            output: m.value_of("output").map(String::from),
            follow: m.is_present("follow"),
            max_redirects,
            mode,
            verbose: m.is_present("verbose"),
        })
    }

    fn request_options(&self, cfg: &Config) -> Result<RequestOptions, Error> {
        let mut opts = match self.method {
            Method::Get => RequestOptions::get(&self.url),
            Method::Post => {
                let body = match &self.body {
                    Some(Body::Inline(b)) => b.clone(),
                    Some(Body::File(path)) => Bytes::from(
                        util::read_all(path)
                            .with_context(|| format!("Failed to read request body from {}", path))?,
                    ),
                    None => Bytes::new(),
                };
                RequestOptions::post(&self.url, body)
            }
        };
        opts.headers = self.headers.clone();

        // an explicit hop budget implies following
        if self.follow || self.max_redirects.is_some() {
            opts = opts.follow_redirects(self.max_redirects.unwrap_or(cfg.max_redirects));
        }
        Ok(opts)
    }
}

pub fn run(cfg: &Config, proxy: SocketAddr, inv: &Invocation) -> Result<(), Error> {
    let opts = inv.request_options(cfg)?;
    let client = Client::new()
        .proxy(proxy)
        .user_id(&cfg.user_id)
        .response_capacity(cfg.response_capacity);

    debug!("{} {} via {}", inv.method, inv.url, proxy);
    let resp = client.perform(&opts)?;
    info!(
        "{} {} -> {} ({} bytes)",
        inv.method,
        inv.url,
        resp.status_code(),
        resp.bytes_received()
    );
    if resp.is_truncated() {
        warn!("output is limited to {} bytes", resp.capacity() - 1);
    }

    let rendered = render(&resp, inv.mode);
    match &inv.output {
        Some(path) => {
            util::write_all(path, &rendered)
                .with_context(|| format!("Failed to write response to {}", path))?;
            info!("response written to {}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(&rendered)?;
            out.flush()?;
        }
    }
    Ok(())
}

pub fn render(resp: &HttpResponse, mode: OutputMode) -> Vec<u8> {
    match mode {
        OutputMode::Raw => resp.raw().to_vec(),
        OutputMode::ContentOnly => resp.body().to_vec(),
        OutputMode::Summary => {
            let mut out = format!(
                "Status: {}\nReceived: {} bytes{}\n\n",
                resp.status_code(),
                resp.bytes_received(),
                if resp.is_truncated() { " (truncated)" } else { "" }
            )
            .into_bytes();
            out.extend_from_slice(resp.raw());
            if !out.ends_with(b"\n") {
                out.push(b'\n');
            }
            out
        }
    }
}

/// `torilate: (<code>) <what failed>: <detail>`
pub fn format_error(e: &Error, verbose: bool) -> String {
    let kind = e.kind();
    let detail = if verbose { e.to_string() } else { e.summary() };
    format!(
        "torilate: ({}) {}: {}",
        kind.exit_code(),
        kind.base_message(),
        detail
    )
}
