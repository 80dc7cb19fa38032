#![allow(clippy::needless_for_each)]

use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod handlers;
pub mod html;
pub mod schema;
pub mod session;
mod shutdown;
#[cfg(test)]
mod testing;
pub mod users;

use self::{
    session::{
        MemorySessionStore, PgSessionStore, SessionConfig, SessionIssuer, SessionStore,
    },
    users::{MemoryUserStore, PgUserStore, UserStore},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::join::join,
        handlers::login::login,
        handlers::logout::logout
    ),
    components(schemas(
        handlers::health::Health,
        handlers::join::JoinForm,
        handlers::login::LoginForm,
        handlers::ActionData,
        handlers::FieldErrors
    )),
    tags(
        (name = "obscurity", description = "Minimal authenticated web application")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router around the given stores.
pub fn router(users: Arc<dyn UserStore>, sessions: Arc<SessionIssuer>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/index", get(handlers::index))
        .route("/join", get(handlers::join_form).post(handlers::join))
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/notes", get(handlers::notes))
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(sessions))
                .layer(Extension(users)),
        )
}

/// Pick PostgreSQL when a DSN is configured, in-memory stores otherwise.
async fn stores(globals: &GlobalArgs) -> Result<(Arc<dyn UserStore>, Arc<dyn SessionStore>)> {
    let Some(dsn) = &globals.dsn else {
        warn!("No DSN configured, users and sessions are kept in memory and lost on restart");
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        return Ok((users, sessions));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    schema::apply(&pool)
        .await
        .context("Failed to apply database schema")?;

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
    Ok((users, sessions))
}

/// Start the server
/// # Errors
/// Return error if the stores cannot be initialized or the listener fails
pub async fn new(port: u16, globals: &GlobalArgs) -> Result<()> {
    let (users, sessions) = stores(globals).await?;

    let config = SessionConfig::new(globals.session_ttl_seconds)
        .with_cookie_secure(globals.cookie_secure);
    let issuer = Arc::new(SessionIssuer::new(sessions, config));

    let app = router(users, issuer);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await?;

    info!("Gracefully shutdown");

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
