use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::session::ConnectParams,
    error::{AppError, ErrorBody},
    services::{session_service, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{code}/ws",
    tag = "websocket",
    params(("code" = String, Path, description = "Session code"), ConnectParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Malformed session code or query", body = ErrorBody)
    )
)]
/// Upgrade the HTTP connection into a session WebSocket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Query(params)): Valid<Query<ConnectParams>>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    session_service::ensure_session_code(&code)?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, code, params)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/ws", get(ws_handler))
}
