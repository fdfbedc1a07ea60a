use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{session::ConnectParams, sse::ServerEvent},
    error::ServiceError,
    services::{session_service::ensure_session_code, sse_events},
    state::SharedState,
};

/// Period of keep-alive comments and connection activity refreshes.
pub(crate) const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Live connection registered for the lifetime of a stream.
///
/// Carries a clone of the shared state so teardown can unregister the
/// connection after the spawned task completes.
pub struct TrackedConnection {
    state: SharedState,
    session: String,
    connection_id: String,
}

impl TrackedConnection {
    /// Register a fresh connection id under `session` as `params.role`.
    pub fn register(state: &SharedState, session: &str, params: ConnectParams) -> Self {
        let connection_id = Uuid::new_v4().simple().to_string();
        state
            .connections()
            .touch(session, params.role, &connection_id, params.name);
        info!(
            session,
            connection_id = %connection_id,
            role = %params.role,
            "connection registered"
        );
        Self {
            state: state.clone(),
            session: session.to_string(),
            connection_id,
        }
    }

    /// Identifier of this connection.
    pub fn id(&self) -> &str {
        &self.connection_id
    }

    /// Bump the session's activity.
    pub fn refresh(&self) {
        self.state.connections().refresh(&self.connection_id);
    }

    /// Handle that refreshes this connection from another task.
    pub fn refresher(&self) -> ActivityRefresher {
        ActivityRefresher::new(&self.state, &self.connection_id)
    }

    /// Unregister the connection.
    pub fn close(self) {
        self.state.connections().remove(&self.connection_id);
        info!(
            session = %self.session,
            connection_id = %self.connection_id,
            "connection closed"
        );
    }
}

/// Bumps the activity of one tracked connection.
#[derive(Clone)]
pub struct ActivityRefresher {
    state: SharedState,
    connection_id: String,
}

impl ActivityRefresher {
    pub(crate) fn new(state: &SharedState, connection_id: &str) -> Self {
        Self {
            state: state.clone(),
            connection_id: connection_id.to_string(),
        }
    }

    /// Bump the session's activity; a no-op once the connection is gone.
    pub fn refresh(&self) {
        self.state.connections().refresh(&self.connection_id);
    }
}

/// Open the SSE stream of `code`, starting with the current snapshot.
pub async fn open_stream(
    state: SharedState,
    code: String,
    params: ConnectParams,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    ensure_session_code(&code)?;
    let (receiver, view) = state.subscribe(&code).await?;
    let connection = TrackedConnection::register(&state, &code, params);
    Ok(to_sse_stream(
        receiver,
        sse_events::snapshot_event(&view),
        connection,
    ))
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects or the session closes.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: Option<ServerEvent>,
    connection: TrackedConnection,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        let mut refresh = tokio::time::interval(KEEP_ALIVE_INTERVAL);

        let delivered = match initial {
            Some(payload) => tx.send(Ok(to_sse_event(payload))).await.is_ok(),
            None => true,
        };

        if delivered {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = refresh.tick() => connection.refresh(),
                    recv_result = receiver.recv() => {
                        match recv_result {
                            Ok(payload) => {
                                let closes = payload.closes_session();
                                if tx.send(Ok(to_sse_event(payload))).await.is_err() || closes {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => break,
                            Err(RecvError::Lagged(skipped)) => {
                                // Skip lagged messages but keep the stream alive.
                                warn!(
                                    connection_id = %connection.id(),
                                    skipped,
                                    "SSE subscriber lagged behind"
                                );
                                continue;
                            }
                        }
                    }
                }
            }
        }

        connection.close();
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn to_sse_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, envelope::Role},
    };

    #[test]
    fn tracked_connections_register_and_close() {
        let state = AppState::new(AppConfig::default());
        let connection = TrackedConnection::register(
            &state,
            "QUIZ42",
            ConnectParams {
                role: Role::Projector,
                name: Some("main screen".into()),
            },
        );

        let counts = state.connections().counts("QUIZ42").unwrap();
        assert_eq!(counts.projector, 1);
        assert_eq!(
            state.connections().display_name(connection.id()).as_deref(),
            Some("main screen")
        );

        connection.close();
        assert!(state.connections().counts("QUIZ42").is_none());
    }
}
