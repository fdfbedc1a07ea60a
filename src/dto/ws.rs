use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::command::CommandRequest;

#[derive(Debug, Deserialize, ToSchema)]
/// Messages accepted from session WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness check; answered with [`ServerMessage::Pong`].
    Ping,
    /// Wraps the same body as `POST /commands`.
    Command {
        /// Command to submit.
        command: Box<CommandRequest>,
    },
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to session WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to [`ClientMessage::Ping`].
    Pong,
    /// The command was accepted (applied, ignored or duplicate).
    #[serde(rename_all = "camelCase")]
    Ack {
        /// Id of the acknowledged command.
        command_id: Uuid,
    },
    /// The command was rejected or could not be parsed.
    #[serde(rename_all = "camelCase")]
    Rejected {
        /// Id of the rejected command, when the frame could be parsed.
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<Uuid>,
        /// Machine-readable reason code.
        code: String,
        /// Human-readable explanation.
        message: String,
    },
    /// Session event relayed from the broadcast hub.
    Event {
        /// Event name, as used on the SSE stream.
        event: String,
        /// Event payload.
        #[schema(value_type = Object)]
        data: serde_json::Value,
    },
}
