use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::{Arg, Command};

use serde::{Deserialize, Serialize};

use derivative::Derivative;

#[derive(Derivative, Deserialize, Serialize)]
#[derivative(Debug, Default)]
#[serde(default)]
pub struct Config {
    #[derivative(Default(value = "torilate::consts::TOR_PROXY_ADDR.to_string()"))]
    pub proxy_addr: String,
    #[derivative(Default(value = "torilate::consts::TOR_PROXY_PORT"))]
    pub proxy_port: u16,
    #[derivative(Default(value = "torilate::consts::DEFAULT_USER_ID.into()"))]
    pub user_id: String,
    #[derivative(Default(value = "torilate::consts::DEFAULT_MAX_REDIRECTS"))]
    pub max_redirects: usize,
    #[derivative(Default(value = "torilate::consts::HTTP_MAX_RESPONSE"))]
    pub response_capacity: usize,
    #[derivative(Default(value = "default_level()"))]
    pub log_level: String,
    pub console_log: bool,
    pub file_log_dir: Option<String>,
}

fn default_level() -> String {
    "warn".into()
}

impl Config {
    pub fn load_from_file(file_name: &str) -> anyhow::Result<Config> {
        let s = std::fs::read_to_string(file_name)
            .with_context(|| format!("read config file {}", file_name))?;
        let c: Config =
            toml::from_str(&s).with_context(|| format!("parse config file {}", file_name))?;
        Ok(c)
    }
    pub fn get_log_level(&self) -> tracing::Level {
        match self.log_level.as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::WARN,
        }
    }
    pub fn get_proxy(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .proxy_addr
            .parse()
            .with_context(|| format!("proxy address {} is not an IP literal", self.proxy_addr))?;
        Ok(SocketAddr::new(ip, self.proxy_port))
    }
    /// Accepts `addr:port` or a bare address.
    pub fn set_proxy(&mut self, proxy: &str) -> anyhow::Result<()> {
        match proxy.parse::<SocketAddr>() {
            Ok(sa) => {
                self.proxy_addr = sa.ip().to_string();
                self.proxy_port = sa.port();
            }
            Err(_) => {
                let ip: IpAddr = proxy
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .parse()
                    .with_context(|| format!("invalid proxy {}", proxy))?;
                self.proxy_addr = ip.to_string();
            }
        }
        Ok(())
    }
}

pub fn add_command_line_args(mut app: Command) -> Command {
    app = app
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help("config file with proxy and logging settings"),
        )
        .arg(
            Arg::new("proxy")
                .long("proxy")
                .takes_value(true)
                .value_name("ADDR:PORT")
                .help("override the Tor SOCKS listener, default 127.0.0.1:9050"),
        )
        .arg(
            Arg::new("user-id")
                .long("user-id")
                .takes_value(true)
                .help("override the SOCKS4 user id"),
        )
        .subcommand(request_args(
            Command::new("get").about("send an HTTP GET request through Tor"),
        ))
        .subcommand(
            request_args(Command::new("post").about("send an HTTP POST request through Tor"))
                .arg(
                    Arg::new("body")
                        .short('b')
                        .long("body")
                        .takes_value(true)
                        .conflicts_with("input")
                        .help("request body"),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .takes_value(true)
                        .value_name("FILE")
                        .help("read the request body from a file"),
                )
                .arg(
                    Arg::new("content-type")
                        .short('t')
                        .long("content-type")
                        .takes_value(true)
                        .help("Content-Type header for the request"),
                ),
        );

    app
}

fn request_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("url")
            .required(true)
            .help("URL to send the request to"),
    )
    .arg(
        Arg::new("output")
            .short('o')
            .long("output")
            .takes_value(true)
            .value_name("FILE")
            .help("write the response to a file"),
    )
    .arg(
        Arg::new("header")
            .short('H')
            .long("header")
            .takes_value(true)
            .multiple_occurrences(true)
            .help("extra request header, may be repeated"),
    )
    .arg(
        Arg::new("follow")
            .short('L')
            .long("follow")
            .help("follow redirects"),
    )
    .arg(
        Arg::new("max-redirs")
            .long("max-redirs")
            .takes_value(true)
            .value_name("N")
            .help("follow redirects up to N times, default 50"),
    )
    .arg(
        Arg::new("raw")
            .short('r')
            .long("raw")
            .conflicts_with("content-only")
            .help("print the raw HTTP response"),
    )
    .arg(
        Arg::new("content-only")
            .short('c')
            .long("content-only")
            .help("print only the response body"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("debug logging and full error chains"),
    )
}
