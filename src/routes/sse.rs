use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use axum_valid::Valid;
use futures::Stream;
use tracing::info;

use crate::{
    dto::session::ConnectParams,
    error::{AppError, ErrorBody},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{code}/events",
    tag = "sse",
    params(("code" = String, Path, description = "Session code"), ConnectParams),
    responses(
        (status = 200, description = "Session event stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Malformed session code or query", body = ErrorBody)
    )
)]
/// Stream the events of a session, starting with its current snapshot.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Query(params)): Valid<Query<ConnectParams>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    info!(session = %code, role = %params.role, "new SSE connection");
    Ok(sse_service::open_stream(state, code, params).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/events", get(session_stream))
}
