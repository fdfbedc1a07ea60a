use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_valid::Valid;

use crate::{
    dto::command::{CommandAck, CommandRequest},
    error::{AppError, ErrorBody},
    services::command_service,
    state::SharedState,
};

/// Routes receiving session commands.
pub fn router() -> Router<SharedState> {
    Router::new().route("/commands", post(submit_command))
}

/// Submit a command to its session.
///
/// Replayed command ids are acknowledged without being applied again.
#[utoipa::path(
    post,
    path = "/commands",
    tag = "commands",
    request_body = CommandRequest,
    responses(
        (status = 202, description = "Command accepted", body = CommandAck),
        (status = 400, description = "Malformed command", body = ErrorBody),
        (status = 409, description = "Command rejected in the current phase", body = ErrorBody),
        (status = 503, description = "Session busy", body = ErrorBody)
    )
)]
pub async fn submit_command(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CommandRequest>>,
) -> Result<(StatusCode, Json<CommandAck>), AppError> {
    let ack = command_service::submit(&state, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}
