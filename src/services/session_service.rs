use validator::ValidationErrors;

use crate::{
    dto::{
        session::{ConnectionCountsResponse, GameStateView},
        validation::validate_session_code,
    },
    error::ServiceError,
    state::SharedState,
};

/// Current snapshot of `code`; unknown sessions are created lazily.
pub async fn snapshot(state: &SharedState, code: &str) -> Result<GameStateView, ServiceError> {
    ensure_session_code(code)?;
    let (snapshot, version) = state.snapshot(code).await?;
    Ok(GameStateView::new(&snapshot, version))
}

/// Live connections of `code`.
pub fn connection_counts(
    state: &SharedState,
    code: &str,
) -> Result<ConnectionCountsResponse, ServiceError> {
    ensure_session_code(code)?;
    state
        .connections()
        .counts(code)
        .map(|counts| ConnectionCountsResponse::new(code, counts))
        .ok_or_else(|| ServiceError::NotFound(format!("session `{code}` has no connections")))
}

/// Drop the session, its idempotency record and its connections.
pub fn reset(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    ensure_session_code(code)?;
    state.reset_session(code);
    Ok(())
}

/// Reject malformed session codes taken from paths.
pub fn ensure_session_code(code: &str) -> Result<(), ServiceError> {
    validate_session_code(code).map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add("code", err);
        ServiceError::from(errors)
    })
}
