//! # Obscurity
//!
//! A small authenticated web application: a landing page plus login and
//! registration forms backed by session cookies.
//!
//! ## Flow
//!
//! Every form submission runs the same pipeline:
//!
//! 1. Requests that already carry a valid session are redirected home.
//! 2. The email and password are validated; failures are reported as
//!    field-scoped errors with `400 Bad Request` and nothing is written.
//! 3. The user store is consulted (create on `/join`, verify on `/login`).
//! 4. A session is issued and the browser is redirected to a same-origin path.
//!
//! ## Stores
//!
//! Users and sessions live behind the [`obscurity::users::UserStore`] and
//! [`obscurity::session::SessionStore`] traits. PostgreSQL backs both in
//! production; in-memory implementations are used when no DSN is configured.

pub mod cli;
pub mod obscurity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
