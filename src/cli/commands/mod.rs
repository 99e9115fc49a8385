use crate::{
    collectors::registry::{DEFAULT_NAMESPACE, DEFAULT_SUBSYSTEM},
    exporter::GIT_COMMIT_HASH,
};
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::{num::NonZeroUsize, path::PathBuf};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("query_exporter")
        .about("SQL query result exporter for Prometheus")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(GIT_COMMIT_HASH)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("9104")
                .env("QUERY_EXPORTER_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .help("IP address to bind to, defaults to [::] with a fallback to 0.0.0.0")
                .env("QUERY_EXPORTER_LISTEN")
                .value_name("IP"),
        )
        .arg(
            Arg::new("config-database")
                .long("config-database")
                .help("Database instances configuration file")
                .default_value("config-database.yml")
                .env("QUERY_EXPORTER_CONFIG_DATABASE")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config-metrics")
                .long("config-metrics")
                .help("Metrics configuration file")
                .default_value("config-metrics.yml")
                .env("QUERY_EXPORTER_CONFIG_METRICS")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .help("Partitions per endpoint, instances of one partition are scraped sequentially")
                .default_value("32")
                .env("QUERY_EXPORTER_THREADS")
                .value_parser(clap::value_parser!(NonZeroUsize)),
        )
        .arg(
            Arg::new("query-timeout")
                .long("query-timeout")
                .help("Default query and health check timeout in seconds")
                .default_value("1")
                .env("QUERY_EXPORTER_QUERY_TIMEOUT")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("connect-timeout")
                .long("connect-timeout")
                .help("Connection timeout in seconds")
                .default_value("5")
                .env("QUERY_EXPORTER_CONNECT_TIMEOUT")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .help("Metric namespace")
                .default_value(DEFAULT_NAMESPACE)
                .env("QUERY_EXPORTER_NAMESPACE"),
        )
        .arg(
            Arg::new("subsystem")
                .long("subsystem")
                .help("Metric subsystem")
                .default_value(DEFAULT_SUBSYSTEM)
                .env("QUERY_EXPORTER_SUBSYSTEM"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        )
}
