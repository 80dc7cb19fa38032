use crate::{
    cli::{globals::GlobalArgs, telemetry},
    obscurity,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the stores cannot be initialized or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let globals = GlobalArgs::new(args.dsn)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_cookie_secure(args.cookie_secure);

    debug!("Global args: {:?}", globals);

    let result = obscurity::new(args.port, &globals).await;

    telemetry::shutdown_tracer();

    result
}
