use crate::obscurity::{
    handlers::{internal_error, HOME_PATH},
    html::notes_page,
    session::SessionIssuer,
    users::UserStore,
};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Anonymous visitors land here, then come back after logging in.
const LOGIN_FOR_NOTES: &str = "/login?redirectTo=%2Fnotes";

/// Protected page, only reachable with a live session.
#[instrument(skip_all)]
pub async fn notes(
    headers: HeaderMap,
    users: Extension<Arc<dyn UserStore>>,
    sessions: Extension<Arc<SessionIssuer>>,
) -> Response {
    let user_id = match sessions.current_user_id(&headers).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            debug!("no session, redirecting to login");
            return Redirect::to(LOGIN_FOR_NOTES).into_response();
        }
        Err(err) => return internal_error("Failed to lookup session", &err),
    };

    match users.get_user_by_id(user_id).await {
        Ok(Some(user)) => Html(notes_page(&user)).into_response(),
        Ok(None) => {
            warn!(%user_id, "session refers to a missing user");
            sessions.destroy(&headers, HOME_PATH).await
        }
        Err(err) => internal_error("Error fetching user", &err),
    }
}
