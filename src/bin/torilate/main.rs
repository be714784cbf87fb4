use std::{path::Path, process};

use clap::{ArgMatches, Command};
use config::Config;

use tracing::{debug, metadata::LevelFilter};
use tracing_subscriber::{
    filter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

mod config;
mod run;
use run::*;

const DEFAULT_CONFIG_FILE: &str = "torilate.toml";
const EXIT_INVALID_ARGS: i32 = 2;

fn main() {
    let mut app = Command::new("torilate")
        .version(torilate::VERSION)
        .about("Send an HTTP GET or POST request through the Tor network.");
    app = config::add_command_line_args(app);

    let matches = app.get_matches();

    let (config, invocation) = match parse_args(&matches) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("torilate: ({}) Invalid arguments: {:#}", EXIT_INVALID_ARGS, e);
            process::exit(EXIT_INVALID_ARGS)
        }
    };
    let proxy = match config.get_proxy() {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("torilate: ({}) Invalid arguments: {:#}", EXIT_INVALID_ARGS, e);
            process::exit(EXIT_INVALID_ARGS)
        }
    };

    init_tracing_subscriber(&config);
    debug!("start with {:#?}", config);
    debug!("{:#?}", invocation);

    if let Err(e) = run(&config, proxy, &invocation) {
        eprintln!("{}", format_error(&e, invocation.verbose));
        process::exit(e.kind().exit_code())
    }
}

fn parse_args(matches: &ArgMatches) -> anyhow::Result<(Config, Invocation)> {
    let mut config = match matches.value_of("config") {
        Some(file) => Config::load_from_file(file)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::load_from_file(DEFAULT_CONFIG_FILE)?
        }
        None => Config::default(),
    };

    if let Some(proxy) = matches.value_of("proxy") {
        config.set_proxy(proxy)?;
    }

    if let Some(user_id) = matches.value_of("user-id") {
        config.user_id = user_id.into();
    }

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow::anyhow!("missing command"))?;
    let invocation = Invocation::from_matches(name, sub)?;

    if invocation.verbose {
        config.log_level = "debug".into();
        config.console_log = true;
    }

    Ok((config, invocation))
}

fn init_tracing_subscriber(c: &Config) {
    let formateter = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true);

    let file_level_filter = LevelFilter::from(c.get_log_level());
    let mut console_level_filter = file_level_filter;
    if !c.console_log {
        console_level_filter = LevelFilter::OFF;
    }

    // stdout carries the response, logs go to stderr
    let layer = tracing_subscriber::registry().with(
        filter::Targets::new()
            .with_target("torilate", console_level_filter)
            .and_then(
                tracing_subscriber::fmt::layer()
                    .event_format(formateter.clone())
                    .with_writer(std::io::stderr),
            ),
    );

    if let Some(dir) = &c.file_log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "torilate.log");
        layer
            .with(
                filter::Targets::new()
                    .with_target("torilate", file_level_filter)
                    .and_then(
                        tracing_subscriber::fmt::layer()
                            .event_format(formateter)
                            .with_writer(file_appender)
                            .with_ansi(false),
                    ),
            )
            .init();
    } else {
        layer.init();
    }
}
