use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        session::GameStateView,
        sse::{CloseReason, EVENT_SESSION_CLOSED, EVENT_SNAPSHOT, ServerEvent, SessionClosedEvent},
    },
    state::{envelope::Event, hub::SessionHub},
};

/// Broadcast the events applied by one command, followed by the resulting snapshot.
pub fn broadcast_applied(hub: &SessionHub, events: &[Event], view: &GameStateView) {
    for event in events {
        send_event(hub, event.kind(), event);
    }
    broadcast_snapshot(hub, view);
}

/// Broadcast the current snapshot.
pub fn broadcast_snapshot(hub: &SessionHub, view: &GameStateView) {
    send_event(hub, EVENT_SNAPSHOT, view);
}

/// Tell subscribers the session is gone; their streams end after this event.
pub fn broadcast_session_closed(hub: &SessionHub, session_code: &str, reason: CloseReason) {
    let payload = SessionClosedEvent {
        session_code: session_code.to_string(),
        reason,
    };
    send_event(hub, EVENT_SESSION_CLOSED, &payload);
}

/// Serialise the current snapshot as a standalone server event.
pub fn snapshot_event(view: &GameStateView) -> Option<ServerEvent> {
    to_server_event(EVENT_SNAPSHOT, view)
}

fn send_event(hub: &SessionHub, event: &str, payload: &impl Serialize) {
    if let Some(event) = to_server_event(event, payload) {
        hub.broadcast(event);
    }
}

fn to_server_event(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize session event payload");
            None
        }
    }
}
