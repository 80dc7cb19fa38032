use crate::obscurity::{
    handlers::internal_error, html::index_page, session::SessionIssuer, users::UserStore,
};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Landing page, personalized when the requester holds a valid session.
#[instrument(skip_all)]
pub async fn index(
    headers: HeaderMap,
    users: Extension<Arc<dyn UserStore>>,
    sessions: Extension<Arc<SessionIssuer>>,
) -> Response {
    let user = match sessions.current_user_id(&headers).await {
        Ok(Some(user_id)) => match users.get_user_by_id(user_id).await {
            Ok(user) => user,
            Err(err) => return internal_error("Error fetching user", &err),
        },
        Ok(None) => None,
        Err(err) => return internal_error("Failed to lookup session", &err),
    };

    Html(index_page(user.as_ref())).into_response()
}
