//! Map validated CLI arguments to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{ARG_COOKIE_SECURE, ARG_DSN, ARG_PORT, ARG_SESSION_TTL};
use crate::cli::globals::DEFAULT_SESSION_TTL_SECONDS;
use anyhow::Result;
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if the arguments are inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty())
        .map(SecretString::from);
    let session_ttl_seconds = matches
        .get_one::<i64>(ARG_SESSION_TTL)
        .copied()
        .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);
    let cookie_secure = matches.get_flag(ARG_COOKIE_SECURE);

    Ok(Action::Server(Args {
        port,
        dsn,
        session_ttl_seconds,
        cookie_secure,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars_unset(
            [
                "OBSCURITY_PORT",
                "OBSCURITY_DSN",
                "OBSCURITY_SESSION_TTL",
                "OBSCURITY_COOKIE_SECURE",
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "obscurity",
                    "--port",
                    "9000",
                    "--dsn",
                    "postgres://localhost/obscurity",
                    "--cookie-secure",
                ]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };
                assert_eq!(args.port, 9000);
                assert_eq!(
                    args.dsn.as_ref().map(|dsn| dsn.expose_secret().to_string()),
                    Some("postgres://localhost/obscurity".to_string())
                );
                assert_eq!(args.session_ttl_seconds, DEFAULT_SESSION_TTL_SECONDS);
                assert!(args.cookie_secure);
            },
        );
    }

    #[test]
    fn blank_dsn_means_in_memory() {
        temp_env::with_vars([("OBSCURITY_DSN", Some("  "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["obscurity"]);
            let Ok(Action::Server(args)) = handler(&matches) else {
                panic!("expected server action");
            };
            assert!(args.dsn.is_none());
        });
    }
}
