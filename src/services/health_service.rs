use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the process health and the number of live sessions.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.session_count())
}
