use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    dto::session::{ConnectionCountsResponse, GameStateView},
    error::{AppError, ErrorBody},
    services::session_service,
    state::SharedState,
};

/// Routes exposing session snapshots and lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{code}", get(get_session).delete(reset_session))
        .route("/sessions/{code}/connections", get(get_connections))
}

/// Current snapshot of a session.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Session snapshot", body = GameStateView),
        (status = 400, description = "Malformed session code", body = ErrorBody)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<GameStateView>, AppError> {
    let view = session_service::snapshot(&state, &code).await?;
    Ok(Json(view))
}

/// Drop a session and close its streams.
#[utoipa::path(
    delete,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 204, description = "Session reset"),
        (status = 400, description = "Malformed session code", body = ErrorBody)
    )
)]
pub async fn reset_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    session_service::reset(&state, &code)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live connections of a session, per role.
#[utoipa::path(
    get,
    path = "/sessions/{code}/connections",
    tag = "sessions",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Connection counts", body = ConnectionCountsResponse),
        (status = 404, description = "Nobody is connected", body = ErrorBody)
    )
)]
pub async fn get_connections(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ConnectionCountsResponse>, AppError> {
    let counts = session_service::connection_counts(&state, &code)?;
    Ok(Json(counts))
}
