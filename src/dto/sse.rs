use serde::Serialize;
use utoipa::ToSchema;

/// SSE event name of the snapshot pushed after every applied command.
pub const EVENT_SNAPSHOT: &str = "snapshot";
/// SSE event name sent when a session is reset or evicted.
pub const EVENT_SESSION_CLOSED: &str = "session_closed";

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends an unnamed `message` event.
    pub event: Option<String>,
    /// JSON-encoded payload.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialised payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Whether this event tells subscribers the session is gone.
    pub fn closes_session(&self) -> bool {
        self.event.as_deref() == Some(EVENT_SESSION_CLOSED)
    }
}

/// Why a session stopped existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Dropped through the reset endpoint.
    Reset,
    /// Evicted after staying idle.
    Idle,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Last event of a stream whose session was reset or evicted.
pub struct SessionClosedEvent {
    /// Code of the closed session.
    pub session_code: String,
    /// What closed it.
    pub reason: CloseReason,
}
