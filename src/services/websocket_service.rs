use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        session::ConnectParams,
        sse::{EVENT_SNAPSHOT, ServerEvent},
        ws::{ClientMessage, ServerMessage},
    },
    services::{
        command_service,
        sse_service::{ActivityRefresher, KEEP_ALIVE_INTERVAL, TrackedConnection},
    },
    state::SharedState,
};

/// Internal error type for socket handling.
#[derive(Debug, Error)]
enum SocketError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle of a session WebSocket connection.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    code: String,
    params: ConnectParams,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (events, view) = match state.subscribe(&code).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(session = %code, error = %err, "failed to subscribe websocket to session");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let connection = TrackedConnection::register(&state, &code, params);

    let initial = ServerMessage::Event {
        event: EVENT_SNAPSHOT.to_string(),
        data: serde_json::to_value(&view).unwrap_or_default(),
    };
    if send_message_to_websocket(&outbound_tx, &initial).is_err() {
        info!(connection_id = %connection.id(), "connection closed before initial snapshot");
        connection.close();
        finalize(writer_task, outbound_tx).await;
        return;
    }

    // Passive clients (projector, engine) may never send a frame.
    let relay_task = tokio::spawn(relay_events(
        events,
        outbound_tx.clone(),
        connection.refresher(),
        KEEP_ALIVE_INTERVAL,
    ));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                connection.refresh();
                debug!(connection_id = %connection.id(), payload = %text, "received websocket message");
                if let Err(err) = handle_text(&state, &code, text.as_str(), &outbound_tx).await {
                    info!(connection_id = %connection.id(), error = %err, "terminating websocket");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                connection.refresh();
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => connection.refresh(),
            Err(err) => {
                warn!(connection_id = %connection.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    relay_task.abort();
    connection.close();
    finalize(writer_task, outbound_tx).await;
}

/// Answer one inbound text frame.
async fn handle_text(
    state: &SharedState,
    code: &str,
    text: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), SocketError> {
    let reply = match ClientMessage::from_json_str(text) {
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Ok(ClientMessage::Command { command }) if command.session_code != code => {
            ServerMessage::Rejected {
                command_id: Some(command.command_id),
                code: "session_mismatch".into(),
                message: format!(
                    "command targets `{}` but this socket is bound to `{code}`",
                    command.session_code
                ),
            }
        }
        Ok(ClientMessage::Command { command }) => {
            let command_id = command.command_id;
            match command_service::submit(state, *command).await {
                Ok(ack) => ServerMessage::Ack {
                    command_id: ack.command_id,
                },
                Err(err) => ServerMessage::Rejected {
                    command_id: Some(command_id),
                    code: err.code().into(),
                    message: err.to_string(),
                },
            }
        }
        Err(err) => {
            warn!(session = code, error = %err, "failed to parse websocket message");
            ServerMessage::Rejected {
                command_id: None,
                code: "invalid_message".into(),
                message: err.to_string(),
            }
        }
    };
    send_message_to_websocket(outbound_tx, &reply)
}

/// Forward hub events to the socket until the session closes or the socket goes away,
/// refreshing the connection's activity every `refresh_period`.
async fn relay_events(
    mut events: broadcast::Receiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    activity: ActivityRefresher,
    refresh_period: Duration,
) {
    let mut refresh = tokio::time::interval(refresh_period);

    loop {
        tokio::select! {
            _ = refresh.tick() => activity.refresh(),
            received = events.recv() => {
                match received {
                    Ok(payload) => {
                        let closes = payload.closes_session();
                        if send_message_to_websocket(&outbound_tx, &to_server_message(payload)).is_err() {
                            break;
                        }
                        if closes {
                            let _ = outbound_tx.send(Message::Close(None));
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket subscriber lagged behind");
                    }
                }
            }
        }
    }
}

fn to_server_message(payload: ServerEvent) -> ServerMessage {
    let data = serde_json::from_str(&payload.data)
        .unwrap_or(serde_json::Value::String(payload.data));
    ServerMessage::Event {
        event: payload.event.unwrap_or_else(|| "message".to_string()),
        data,
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is an error.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), SocketError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
