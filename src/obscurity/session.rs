//! Cookie sessions.
//!
//! The raw token only ever lives in the browser cookie; stores keep a SHA-256
//! hash of it. [`SessionIssuer`] is the single place that turns a user id into
//! a `Set-Cookie` + redirect response and a request back into a user id.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    http::{
        header::{InvalidHeaderValue, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, error, Instrument};
use uuid::Uuid;

use super::users::is_unique_violation;

pub const SESSION_COOKIE_NAME: &str = "obscurity_session";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a session for `user_id` under `token_hash`.
    ///
    /// Returns `Ok(false)` when the hash is already taken.
    async fn insert(&self, token_hash: &[u8], user_id: Uuid, ttl_seconds: i64) -> Result<bool>;

    /// Resolve an unexpired session to its user id.
    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<Uuid>>;

    /// Idempotent; deleting a missing session is not an error.
    async fn delete(&self, token_hash: &[u8]) -> Result<()>;
}

/// Create a new session token for the auth cookie.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == SESSION_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    ttl_seconds: i64,
    cookie_secure: bool,
}

impl SessionConfig {
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

pub struct SessionIssuer {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session for `user_id` and redirect to `redirect_to` with the
    /// session cookie set. `remember` makes the cookie outlive the browser
    /// session.
    ///
    /// # Errors
    /// Returns an error if `redirect_to` is not a valid `Location` value (no
    /// session is created then) or if the session cannot be stored.
    pub async fn issue(&self, user_id: Uuid, remember: bool, redirect_to: &str) -> Result<Response> {
        let location = HeaderValue::from_str(redirect_to).context("invalid redirect target")?;

        let token = self.create_session(user_id).await?;
        let cookie = self
            .session_cookie(&token, remember)
            .context("failed to build session cookie")?;

        debug!(%user_id, remember, "session issued");

        let mut headers = HeaderMap::new();
        headers.insert(SET_COOKIE, cookie);
        headers.insert(LOCATION, location);
        Ok((StatusCode::SEE_OTHER, headers).into_response())
    }

    /// Resolve the session cookie into a user id.
    ///
    /// Returns `Ok(None)` when the cookie is missing, unknown or expired.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn current_user_id(&self, headers: &HeaderMap) -> Result<Option<Uuid>> {
        let Some(token) = extract_session_token(headers) else {
            return Ok(None);
        };
        self.store.lookup(&hash_session_token(&token)).await
    }

    /// Drop the server-side session (if any) and redirect to `redirect_to`
    /// with a cookie that clears the browser copy.
    pub async fn destroy(&self, headers: &HeaderMap, redirect_to: &str) -> Response {
        if let Some(token) = extract_session_token(headers) {
            if let Err(err) = self.store.delete(&hash_session_token(&token)).await {
                error!("Failed to delete session: {err:#}");
            }
        }

        // Always clear the cookie, even if the session record was missing.
        let mut response_headers = HeaderMap::new();
        if let Ok(cookie) = self.clear_session_cookie() {
            response_headers.insert(SET_COOKIE, cookie);
        }
        (response_headers, Redirect::to(redirect_to)).into_response()
    }

    async fn create_session(&self, user_id: Uuid) -> Result<String> {
        for _ in 0..3 {
            let token = generate_session_token()?;
            if self
                .store
                .insert(&hash_session_token(&token), user_id, self.config.ttl_seconds)
                .await?
            {
                return Ok(token);
            }
        }

        Err(anyhow!("failed to generate unique session token"))
    }

    fn session_cookie(&self, token: &str, remember: bool) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
        if remember {
            cookie.push_str(&format!("; Max-Age={}", self.config.ttl_seconds));
        }
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    fn clear_session_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop every expired session; browser-session cookies are rarely
    /// presented again, so lookups alone never clean them up.
    async fn prune_expired(&self) -> Result<()> {
        let query = "DELETE FROM user_sessions WHERE expires_at <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to prune expired sessions")?;
        if result.rows_affected() > 0 {
            debug!(pruned = result.rows_affected(), "expired sessions removed");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, token_hash: &[u8], user_id: Uuid, ttl_seconds: i64) -> Result<bool> {
        self.prune_expired().await?;

        let query = r"
            INSERT INTO user_sessions (session_hash, user_id, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err).context("failed to insert session"),
        }
    }

    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<Uuid>> {
        let query = r"
            SELECT user_id
            FROM user_sessions
            WHERE session_hash = $1
              AND expires_at > NOW()
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| row.get("user_id")))
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM user_sessions WHERE session_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

struct MemorySession {
    user_id: Uuid,
    expires_at: Instant,
}

/// Process-local session store; expired entries are dropped on lookup and
/// swept on every insert.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Vec<u8>, MemorySession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// User ids of every stored session, expired or not.
    pub async fn user_ids(&self) -> Vec<Uuid> {
        self.sessions
            .read()
            .await
            .values()
            .map(|session| session.user_id)
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, token_hash: &[u8], user_id: Uuid, ttl_seconds: i64) -> Result<bool> {
        let ttl = Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(0));
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        if sessions.contains_key(token_hash) {
            return Ok(false);
        }
        sessions.insert(
            token_hash.to_vec(),
            MemorySession {
                user_id,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<Uuid>> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token_hash) {
                None => return Ok(None),
                Some(session) if session.expires_at > now => return Ok(Some(session.user_id)),
                Some(_) => {}
            }
        }

        self.sessions.write().await.remove(token_hash);
        Ok(None)
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        self.sessions.write().await.remove(token_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(store: Arc<MemorySessionStore>) -> SessionIssuer {
        SessionIssuer::new(store, SessionConfig::new(3600))
    }

    fn cookie_token(response: &Response) -> Option<String> {
        let cookie = response.headers().get(SET_COOKIE)?.to_str().ok()?;
        let (pair, _) = cookie.split_once(';')?;
        let (_, token) = pair.split_once('=')?;
        Some(token.to_string())
    }

    #[test]
    fn generate_session_token_is_32_bytes() {
        let decoded_len = generate_session_token()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_session_token_stable() {
        assert_eq!(hash_session_token("token"), hash_session_token("token"));
        assert_ne!(hash_session_token("token"), hash_session_token("other"));
    }

    #[test]
    fn extract_session_token_finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; obscurity_session=abc123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_session_token_ignores_empty_and_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
        headers.insert(COOKIE, HeaderValue::from_static("obscurity_session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[tokio::test]
    async fn issue_sets_cookie_and_redirects() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let issuer = issuer(store.clone());
        let user_id = Uuid::new_v4();

        let response = issuer.issue(user_id, false, "/notes").await?;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION),
            Some(&HeaderValue::from_static("/notes"))
        );
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.starts_with("obscurity_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Max-Age"));
        assert!(!cookie.contains("Secure"));
        assert_eq!(store.user_ids().await, vec![user_id]);
        Ok(())
    }

    #[tokio::test]
    async fn remember_sets_max_age_and_secure_flag() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let issuer = SessionIssuer::new(store, SessionConfig::new(600).with_cookie_secure(true));

        let response = issuer.issue(Uuid::new_v4(), true, "/").await?;
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.contains("Max-Age=600"));
        assert!(cookie.ends_with("; Secure"));
        Ok(())
    }

    #[tokio::test]
    async fn current_user_id_round_trips_cookie() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let issuer = issuer(store);
        let user_id = Uuid::new_v4();

        let response = issuer.issue(user_id, false, "/").await?;
        let token = cookie_token(&response).unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("obscurity_session={token}"))?);
        assert_eq!(issuer.current_user_id(&headers).await?, Some(user_id));

        let mut forged = HeaderMap::new();
        forged.insert(COOKIE, HeaderValue::from_static("obscurity_session=forged"));
        assert_eq!(issuer.current_user_id(&forged).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn destroy_removes_session_and_clears_cookie() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let issuer = issuer(store.clone());

        let response = issuer.issue(Uuid::new_v4(), true, "/").await?;
        let token = cookie_token(&response).unwrap_or_default();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("obscurity_session={token}"))?);

        let response = issuer.destroy(&headers, "/").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.contains("Max-Age=0"));
        assert!(store.is_empty().await);
        assert_eq!(issuer.current_user_id(&headers).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_expires_sessions() -> Result<()> {
        let store = MemorySessionStore::new();
        let hash = hash_session_token("token");
        assert!(store.insert(&hash, Uuid::new_v4(), 0).await?);
        assert_eq!(store.lookup(&hash).await?, None);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_prunes_expired_on_insert() -> Result<()> {
        let store = MemorySessionStore::new();
        assert!(store.insert(&hash_session_token("stale"), Uuid::new_v4(), 0).await?);
        assert!(store.insert(&hash_session_token("fresh"), Uuid::new_v4(), 60).await?);
        assert_eq!(store.len().await, 1);
        assert!(store.lookup(&hash_session_token("fresh")).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn issue_rejects_unencodable_target_without_storing() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let issuer = issuer(store.clone());

        let result = issuer.issue(Uuid::new_v4(), false, "/notes\r\nSet-Cookie: x").await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_hash() -> Result<()> {
        let store = MemorySessionStore::new();
        let hash = hash_session_token("token");
        assert!(store.insert(&hash, Uuid::new_v4(), 60).await?);
        assert!(!store.insert(&hash, Uuid::new_v4(), 60).await?);
        Ok(())
    }
}
