use time::OffsetDateTime;
use tracing::info;
use validator::Validate;

use crate::{
    dto::command::{CommandAck, CommandRequest},
    error::ServiceError,
    state::{CommandOutcome, SharedState},
};

/// Validate and run a command request, acknowledging it on success.
///
/// Duplicates and commands whose events were all ignored are acknowledged the
/// same way as applied ones.
pub async fn submit(state: &SharedState, request: CommandRequest) -> Result<CommandAck, ServiceError> {
    request.validate()?;
    let command = request.into_command(OffsetDateTime::now_utc());

    match state.run_command(&command).await? {
        CommandOutcome::Accepted(accepted) if !accepted.applied.is_empty() => {
            info!(
                session = %command.session_code,
                command_id = %command.id,
                command = %command.name(),
                role = %command.issued_by_role,
                version = accepted.version,
                "command applied"
            );
        }
        CommandOutcome::Accepted(_) | CommandOutcome::Duplicate => {}
    }

    Ok(CommandAck::accepted(command.id))
}
