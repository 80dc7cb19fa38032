pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_SESSION_TTL: &str = "session-ttl";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("obscurity")
        .about("Minimal authenticated web application")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("OBSCURITY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string. When omitted, users and sessions are kept in memory and lost on restart.",
                )
                .env("OBSCURITY_DSN"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long("session-ttl")
                .help("Session lifetime in seconds")
                .default_value("604800")
                .env("OBSCURITY_SESSION_TTL")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long("cookie-secure")
                .help("Mark the session cookie Secure (serve behind HTTPS)")
                .env("OBSCURITY_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        );

    logging::with_args(command)
}
