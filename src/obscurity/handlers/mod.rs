pub mod health;
pub use self::health::health;

pub mod index;
pub use self::index::index;

pub mod join;
pub use self::join::{join, join_form};

pub mod login;
pub use self::login::{login, login_form};

pub mod logout;
pub use self::logout::logout;

pub mod notes;
pub use self::notes::notes;

// common functions for the handlers
use crate::obscurity::session::SessionIssuer;
use axum::{
    http::{header::ACCEPT, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};
use tracing::{debug, error};
use utoipa::ToSchema;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const HOME_PATH: &str = "/";

/// User-input failures, each attached to exactly one form field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldError {
    InvalidEmail,
    MissingPassword,
    PasswordTooShort,
    EmailAlreadyInUse,
    InvalidCredentials,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
}

impl FieldError {
    #[must_use]
    pub const fn field(self) -> Field {
        match self {
            Self::InvalidEmail | Self::EmailAlreadyInUse | Self::InvalidCredentials => Field::Email,
            Self::MissingPassword | Self::PasswordTooShort => Field::Password,
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Email is invalid",
            Self::MissingPassword => "Password is required",
            Self::PasswordTooShort => "Password is too short",
            Self::EmailAlreadyInUse => "This email is already in use!",
            Self::InvalidCredentials => "Invalid email or password",
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Per-field messages, `null` for fields without an error.
#[derive(ToSchema, Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl From<FieldError> for FieldErrors {
    fn from(err: FieldError) -> Self {
        let message = Some(err.message().to_string());
        match err.field() {
            Field::Email => Self {
                email: message,
                password: None,
            },
            Field::Password => Self {
                email: None,
                password: message,
            },
        }
    }
}

/// JSON body returned for failed submissions: `{"errors": {...}}`.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionData {
    pub errors: FieldErrors,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Check presence and minimum length, counted in UTF-16 code units like a
/// browser's `String.length`.
///
/// # Errors
/// Returns `MissingPassword` for an empty value and `PasswordTooShort` below
/// [`MIN_PASSWORD_LENGTH`].
pub fn validate_password(password: &str) -> Result<(), FieldError> {
    if password.is_empty() {
        return Err(FieldError::MissingPassword);
    }
    if password.encode_utf16().count() < MIN_PASSWORD_LENGTH {
        return Err(FieldError::PasswordTooShort);
    }
    Ok(())
}

/// Email then password, stopping at the first failure.
///
/// # Errors
/// Returns the first [`FieldError`] found.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), FieldError> {
    if !valid_email(email) {
        return Err(FieldError::InvalidEmail);
    }
    validate_password(password)
}

/// Only same-origin relative paths that can be sent as a `Location` header
/// are accepted as redirect targets.
#[must_use]
pub fn safe_redirect(to: Option<&str>, default: &str) -> String {
    match to {
        Some(to)
            if to.starts_with('/')
                && !to.starts_with("//")
                && HeaderValue::from_str(to).is_ok() =>
        {
            to.to_string()
        }
        _ => default.to_string(),
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("application/json"))
}

/// 400 response for a rejected submission: JSON for API clients, otherwise
/// the re-rendered form produced by `render`.
pub(crate) fn reject<F>(headers: &HeaderMap, err: FieldError, render: F) -> Response
where
    F: FnOnce(&FieldErrors) -> String,
{
    let errors = FieldErrors::from(err);
    if wants_json(headers) {
        (StatusCode::BAD_REQUEST, Json(ActionData { errors })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Html(render(&errors))).into_response()
    }
}

/// Query string accepted by the form pages.
#[derive(Deserialize, Debug, Default)]
pub struct RedirectQuery {
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// Short-circuit for the auth forms: a requester that already holds a valid
/// session is sent home instead of registering or logging in again.
pub(crate) async fn redirect_if_signed_in(
    sessions: &SessionIssuer,
    headers: &HeaderMap,
) -> Option<Response> {
    match sessions.current_user_id(headers).await {
        Ok(Some(user_id)) => {
            debug!(%user_id, "already signed in");
            Some(Redirect::to(HOME_PATH).into_response())
        }
        Ok(None) => None,
        Err(err) => Some(internal_error("Failed to lookup session", &err)),
    }
}

/// Log an upstream failure and hide it behind a generic 500.
pub(crate) fn internal_error(context: &str, err: &anyhow::Error) -> Response {
    error!("{context}: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@b.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_anything_without_at() {
        for value in ["", "plain", "missing-at.example.com", "a b.com", "@@"] {
            assert!(!valid_email(value), "{value:?} should be rejected");
        }
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("missing-domain@"));
        assert!(!valid_email("a@b@c.com"));
        assert!(!valid_email("with space@example.com"));
    }

    #[test]
    fn validate_password_lengths() {
        assert_eq!(validate_password(""), Err(FieldError::MissingPassword));
        for len in 1..MIN_PASSWORD_LENGTH {
            assert_eq!(
                validate_password(&"x".repeat(len)),
                Err(FieldError::PasswordTooShort)
            );
        }
        assert_eq!(validate_password(&"x".repeat(MIN_PASSWORD_LENGTH)), Ok(()));
        assert_eq!(validate_password(&"x".repeat(64)), Ok(()));
    }

    #[test]
    fn validate_password_counts_utf16_units() {
        // 7 units, 14 bytes
        assert_eq!(
            validate_password("ééééééé"),
            Err(FieldError::PasswordTooShort)
        );
        assert_eq!(validate_password("éééééééé"), Ok(()));
        // each emoji is a surrogate pair
        assert_eq!(validate_password("😀😀😀😀"), Ok(()));
        assert_eq!(
            validate_password("😀😀😀"),
            Err(FieldError::PasswordTooShort)
        );
    }

    #[test]
    fn validate_credentials_checks_email_first() {
        assert_eq!(
            validate_credentials("nope", ""),
            Err(FieldError::InvalidEmail)
        );
        assert_eq!(
            validate_credentials("a@b.com", "short"),
            Err(FieldError::PasswordTooShort)
        );
        assert_eq!(validate_credentials("a@b.com", "long enough"), Ok(()));
    }

    #[test]
    fn field_errors_scope_to_one_field() {
        assert_eq!(
            FieldErrors::from(FieldError::PasswordTooShort),
            FieldErrors {
                email: None,
                password: Some("Password is too short".to_string()),
            }
        );
        assert_eq!(
            FieldErrors::from(FieldError::InvalidCredentials),
            FieldErrors {
                email: Some("Invalid email or password".to_string()),
                password: None,
            }
        );
    }

    #[test]
    fn action_data_serializes_nulls() -> anyhow::Result<()> {
        let body = serde_json::to_value(ActionData {
            errors: FieldError::PasswordTooShort.into(),
        })?;
        assert_eq!(
            body,
            serde_json::json!({"errors": {"email": null, "password": "Password is too short"}})
        );
        Ok(())
    }

    #[test]
    fn safe_redirect_accepts_relative_paths() {
        assert_eq!(safe_redirect(Some("/notes"), "/"), "/notes");
        assert_eq!(safe_redirect(Some("/notes?x=1"), "/"), "/notes?x=1");
    }

    #[test]
    fn safe_redirect_rejects_other_targets() {
        assert_eq!(safe_redirect(Some("http://evil.com"), "/"), "/");
        assert_eq!(safe_redirect(Some("//evil.com"), "/"), "/");
        assert_eq!(safe_redirect(Some("notes"), "/"), "/");
        assert_eq!(safe_redirect(Some(""), "/home"), "/home");
        assert_eq!(safe_redirect(None, "/"), "/");
        assert_eq!(safe_redirect(Some("/notes\r\nSet-Cookie: x"), "/"), "/");
    }

    #[test]
    fn wants_json_reads_accept_header() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );
        assert!(wants_json(&headers));
    }
}
