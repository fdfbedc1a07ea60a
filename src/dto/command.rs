use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::validation::{validate_not_blank, validate_session_code},
    state::envelope::{Command, CommandKind, Role, Song},
};

/// Command submitted by a performer, projector, engine or audience client.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Idempotency key chosen by the client.
    pub command_id: Uuid,
    #[validate(custom(function = "validate_session_code"))]
    pub session_code: String,
    pub issued_by_role: Role,
    /// Issuer identifier; audience answers are scored under this id.
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub issued_by_id: String,
    /// Client clock; the server clock is used when omitted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub issued_at_utc: Option<OffsetDateTime>,
    #[serde(flatten)]
    #[validate(nested)]
    pub payload: CommandPayload,
}

impl CommandRequest {
    /// Convert into a domain command, stamping `now` when the client sent no timestamp.
    pub fn into_command(self, now: OffsetDateTime) -> Command {
        Command {
            id: self.command_id,
            session_code: self.session_code,
            issued_by_role: self.issued_by_role,
            issued_by_id: self.issued_by_id,
            issued_at: self.issued_at_utc.unwrap_or(now),
            kind: self.payload.into(),
        }
    }
}

/// Concrete command, selected by the `type` field.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum CommandPayload {
    /// Load the catalog and open the lobby.
    CreateSession {
        /// Songs of the show, in play order.
        catalog: Vec<SongInput>,
    },
    StartGame,
    GiveHint,
    OpenGuessing,
    #[serde(rename_all = "camelCase")]
    SubmitAnswer { choice_index: usize },
    LockAnswers,
    #[serde(rename_all = "camelCase")]
    RevealAnswer { correct_choice_index: usize },
    PlaySong,
    EndSong,
    NextRound,
}

impl Validate for CommandPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let CommandPayload::CreateSession { catalog } = self else {
            return Ok(());
        };

        let mut errors = ValidationErrors::new();

        if catalog.is_empty() {
            let mut err = ValidationError::new("catalog_empty");
            err.message = Some("Catalog must contain at least one song".into());
            errors.add("catalog", err);
        }

        let mut seen = HashSet::new();
        for (index, song) in catalog.iter().enumerate() {
            if let Err(song_errors) = song.validate() {
                let mut err = ValidationError::new("catalog_song");
                err.message = Some(format!("Song #{index} is invalid: {song_errors}").into());
                errors.add("catalog", err);
            }
            if !seen.insert(song.id.as_str()) {
                let mut err = ValidationError::new("catalog_duplicate_id");
                err.message = Some(format!("Song id `{}` appears more than once", song.id).into());
                errors.add("catalog", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<CommandPayload> for CommandKind {
    fn from(payload: CommandPayload) -> Self {
        match payload {
            CommandPayload::CreateSession { catalog } => CommandKind::CreateSession {
                catalog: catalog.into_iter().map(Song::from).collect(),
            },
            CommandPayload::StartGame => CommandKind::StartGame,
            CommandPayload::GiveHint => CommandKind::GiveHint,
            CommandPayload::OpenGuessing => CommandKind::OpenGuessing,
            CommandPayload::SubmitAnswer { choice_index } => {
                CommandKind::SubmitAnswer { choice_index }
            }
            CommandPayload::LockAnswers => CommandKind::LockAnswers,
            CommandPayload::RevealAnswer {
                correct_choice_index,
            } => CommandKind::RevealAnswer {
                correct_choice_index,
            },
            CommandPayload::PlaySong => CommandKind::PlaySong,
            CommandPayload::EndSong => CommandKind::EndSong,
            CommandPayload::NextRound => CommandKind::NextRound,
        }
    }
}

/// Song details supplied when creating a session.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SongInput {
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    /// At least two answer options.
    #[validate(length(min = 2))]
    pub choices: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    #[validate(url)]
    pub media_url: Option<String>,
}

impl From<SongInput> for Song {
    fn from(input: SongInput) -> Self {
        Song {
            id: input.id,
            title: input.title,
            artist: input.artist,
            choices: input.choices,
            hints: input.hints,
            media_url: input.media_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Processing status reported to the issuer.
pub enum CommandStatus {
    /// Applied, ignored as a no-op, or recognised as a duplicate.
    Accepted,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Body of a `202 Accepted` command response.
pub struct CommandAck {
    pub status: CommandStatus,
    pub command_id: Uuid,
}

impl CommandAck {
    /// Acknowledge `command_id`.
    pub fn accepted(command_id: Uuid) -> Self {
        Self {
            status: CommandStatus::Accepted,
            command_id,
        }
    }
}
