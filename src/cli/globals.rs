use secrecy::SecretString;

/// Seven days, matching the "remember me" cookie lifetime.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60 * 24 * 7;

#[derive(Clone)]
pub struct GlobalArgs {
    pub dsn: Option<SecretString>,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(dsn: Option<SecretString>) -> Self {
        Self {
            dsn,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}
