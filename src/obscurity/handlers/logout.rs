use crate::obscurity::{handlers::HOME_PATH, session::SessionIssuer};
use axum::{extract::Extension, http::HeaderMap, response::Response};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/logout",
    responses (
        (status = 303, description = "Session removed, cookie cleared, redirect to `/`"),
    ),
    tag= "logout"
)]
#[instrument(skip_all)]
pub async fn logout(headers: HeaderMap, sessions: Extension<Arc<SessionIssuer>>) -> Response {
    sessions.destroy(&headers, HOME_PATH).await
}
