use crate::obscurity::{
    handlers::{
        internal_error, normalize_email, redirect_if_signed_in, reject, safe_redirect,
        validate_credentials, ActionData, FieldError, FieldErrors, RedirectQuery, HOME_PATH,
    },
    html::login_page,
    session::SessionIssuer,
    users::UserStore,
};
use axum::{
    extract::{Extension, Query, RawQuery},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    Form,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

/// Where the login form sends users when no `redirectTo` was requested.
const DEFAULT_LOGIN_REDIRECT: &str = "/notes";

#[derive(ToSchema, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "redirectTo")]
    redirect_to: Option<String>,
    /// Checkbox value, `on` when ticked.
    #[serde(default)]
    remember: Option<String>,
}

/// Hidden `redirectTo` value for the rendered form: what was submitted, else
/// the query string, else the notes page.
fn form_redirect<'a>(submitted: Option<&'a str>, query: Option<&'a str>) -> &'a str {
    submitted
        .filter(|to| !to.is_empty())
        .or_else(|| query.filter(|to| !to.is_empty()))
        .unwrap_or(DEFAULT_LOGIN_REDIRECT)
}

impl LoginForm {
    fn remember(&self) -> bool {
        self.remember.as_deref() == Some("on")
    }
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"***")
            .field("redirect_to", &self.redirect_to)
            .field("remember", &self.remember)
            .finish()
    }
}

/// Render the login form.
pub async fn login_form(
    headers: HeaderMap,
    sessions: Extension<Arc<SessionIssuer>>,
    Query(query): Query<RedirectQuery>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    if let Some(response) = redirect_if_signed_in(&sessions, &headers).await {
        return response;
    }

    Html(login_page(
        form_redirect(None, query.redirect_to.as_deref()),
        raw_query.as_deref(),
        &FieldErrors::default(),
    ))
    .into_response()
}

#[utoipa::path(
    post,
    path= "/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 303, description = "Credentials accepted, session cookie set, redirect to `redirectTo`"),
        (status = 400, description = "Invalid input or credentials", body = ActionData),
        (status = 500, description = "User store failure"),
    ),
    tag= "login"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    users: Extension<Arc<dyn UserStore>>,
    sessions: Extension<Arc<SessionIssuer>>,
    Query(query): Query<RedirectQuery>,
    RawQuery(raw_query): RawQuery,
    Form(form): Form<LoginForm>,
) -> Response {
    if let Some(response) = redirect_if_signed_in(&sessions, &headers).await {
        return response;
    }

    debug!("login: {:?}", form);

    let redirect_to = safe_redirect(form.redirect_to.as_deref(), HOME_PATH);
    let email = normalize_email(&form.email);
    let rerender = |errors: &FieldErrors| {
        login_page(
            form_redirect(form.redirect_to.as_deref(), query.redirect_to.as_deref()),
            raw_query.as_deref(),
            errors,
        )
    };

    if let Err(err) = validate_credentials(&email, &form.password) {
        debug!("login rejected: {err}");
        return reject(&headers, err, rerender);
    }

    let password = SecretString::from(form.password.clone());
    let user = match users.verify_login(&email, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("login rejected: invalid credentials");
            return reject(&headers, FieldError::InvalidCredentials, rerender);
        }
        Err(err) => return internal_error("Error verifying credentials", &err),
    };

    info!(user_id = %user.id, remember = form.remember(), "user logged in");

    match sessions.issue(user.id, form.remember(), &redirect_to).await {
        Ok(response) => response,
        Err(err) => internal_error("Error issuing session", &err),
    }
}
