use crate::obscurity::{
    handlers::{
        internal_error, normalize_email, redirect_if_signed_in, reject, safe_redirect,
        validate_credentials, ActionData, FieldError, FieldErrors, RedirectQuery, HOME_PATH,
    },
    html::join_page,
    session::SessionIssuer,
    users::{CreateOutcome, UserStore},
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

#[derive(ToSchema, Deserialize, Default)]
pub struct JoinForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    /// Collected but not checked against any invite list.
    #[serde(default, rename = "invCode")]
    inv_code: Option<String>,
    #[serde(default, rename = "redirectTo")]
    redirect_to: Option<String>,
}

impl std::fmt::Debug for JoinForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinForm")
            .field("email", &self.email)
            .field("password", &"***")
            .field("inv_code", &self.inv_code)
            .field("redirect_to", &self.redirect_to)
            .finish()
    }
}

/// Render the registration form.
pub async fn join_form(
    headers: HeaderMap,
    sessions: Extension<Arc<SessionIssuer>>,
    Query(query): Query<RedirectQuery>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    if let Some(response) = redirect_if_signed_in(&sessions, &headers).await {
        return response;
    }

    Html(join_page(
        query.redirect_to.as_deref(),
        raw_query.as_deref(),
        &FieldErrors::default(),
    ))
    .into_response()
}

#[utoipa::path(
    post,
    path= "/join",
    request_body(content = JoinForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 303, description = "User created, session cookie set, redirect to `redirectTo`"),
        (status = 400, description = "Invalid email or password, or email already in use", body = ActionData),
        (status = 500, description = "User store failure"),
    ),
    tag= "join"
)]
#[instrument(skip_all)]
pub async fn join(
    headers: HeaderMap,
    users: Extension<Arc<dyn UserStore>>,
    sessions: Extension<Arc<SessionIssuer>>,
    RawQuery(raw_query): RawQuery,
    Form(form): Form<JoinForm>,
) -> Response {
    if let Some(response) = redirect_if_signed_in(&sessions, &headers).await {
        return response;
    }

    debug!("join: {:?}", form);

    let redirect_to = safe_redirect(form.redirect_to.as_deref(), HOME_PATH);
    let email = normalize_email(&form.email);
    let rerender =
        |errors: &FieldErrors| join_page(form.redirect_to.as_deref(), raw_query.as_deref(), errors);

    if let Err(err) = validate_credentials(&email, &form.password) {
        debug!("join rejected: {err}");
        return reject(&headers, err, rerender);
    }

    if form.inv_code.as_deref().is_some_and(|code| !code.trim().is_empty()) {
        debug!("invite code supplied, not validated");
    }

    match users.get_user_by_email(&email).await {
        Ok(Some(_)) => {
            debug!("join rejected: email already registered");
            return reject(&headers, FieldError::EmailAlreadyInUse, rerender);
        }
        Ok(None) => (),
        Err(err) => return internal_error("Error checking if user exists", &err),
    }

    let password = SecretString::from(form.password.clone());
    let user = match users.create_user(&email, &password).await {
        Ok(CreateOutcome::Created(user)) => user,
        // Lost a race with a concurrent registration for the same email.
        Ok(CreateOutcome::Conflict) => {
            debug!("join rejected: unique constraint on email");
            return reject(&headers, FieldError::EmailAlreadyInUse, rerender);
        }
        Err(err) => return internal_error("Error creating user", &err),
    };

    info!(user_id = %user.id, "user registered");

    match sessions.issue(user.id, false, &redirect_to).await {
        Ok(response) => response,
        Err(err) => internal_error("Error issuing session", &err),
    }
}
