use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::phase::Phase;

/// Role tag carried by every command and connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    /// Host driving the show.
    Performer,
    /// Big screen rendering the show.
    Projector,
    /// A member of the audience answering questions.
    Audience,
    /// Playback engine in charge of audio cues.
    Engine,
}

impl Role {
    /// Every role, in display order.
    pub const ALL: [Role; 4] = [Role::Performer, Role::Projector, Role::Engine, Role::Audience];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Catalog entry played during the show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Stable identifier of the song inside the catalog.
    pub id: String,
    /// Title shown on reveal.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Answer options, in display order.
    pub choices: Vec<String>,
    /// Hints given one at a time before guessing opens.
    ///
    /// Never serialized: revealed hints reach clients through the snapshot view only.
    #[serde(skip_serializing)]
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// Concrete intent carried by a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Load the catalog and open the lobby.
    CreateSession {
        /// Songs played during the show, in order.
        catalog: Vec<Song>,
    },
    /// Open the first song.
    StartGame,
    /// Reveal the next hint of the current song.
    GiveHint,
    /// Let the audience submit answers.
    OpenGuessing,
    /// Audience answer for the current song.
    SubmitAnswer {
        /// Index into the current song's choices.
        choice_index: usize,
    },
    /// Close answer submission.
    LockAnswers,
    /// Reveal and score the correct choice.
    RevealAnswer {
        /// Index into the current song's choices.
        correct_choice_index: usize,
    },
    /// Ask the engine to play the full song.
    PlaySong,
    /// Stop playback and move to the intermission.
    EndSong,
    /// Move the song cursor forward.
    NextRound,
}

/// Payload-free discriminant of [`CommandKind`], used as the phase rules key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    /// See [`CommandKind::CreateSession`].
    CreateSession,
    /// See [`CommandKind::StartGame`].
    StartGame,
    /// See [`CommandKind::GiveHint`].
    GiveHint,
    /// See [`CommandKind::OpenGuessing`].
    OpenGuessing,
    /// See [`CommandKind::SubmitAnswer`].
    SubmitAnswer,
    /// See [`CommandKind::LockAnswers`].
    LockAnswers,
    /// See [`CommandKind::RevealAnswer`].
    RevealAnswer,
    /// See [`CommandKind::PlaySong`].
    PlaySong,
    /// See [`CommandKind::EndSong`].
    EndSong,
    /// See [`CommandKind::NextRound`].
    NextRound,
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl CommandKind {
    /// Discriminant used to look up the phase rules of this command.
    pub fn name(&self) -> CommandName {
        match self {
            CommandKind::CreateSession { .. } => CommandName::CreateSession,
            CommandKind::StartGame => CommandName::StartGame,
            CommandKind::GiveHint => CommandName::GiveHint,
            CommandKind::OpenGuessing => CommandName::OpenGuessing,
            CommandKind::SubmitAnswer { .. } => CommandName::SubmitAnswer,
            CommandKind::LockAnswers => CommandName::LockAnswers,
            CommandKind::RevealAnswer { .. } => CommandName::RevealAnswer,
            CommandKind::PlaySong => CommandName::PlaySong,
            CommandKind::EndSong => CommandName::EndSong,
            CommandKind::NextRound => CommandName::NextRound,
        }
    }
}

/// Actor-issued intent, identified by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Idempotency key.
    pub id: Uuid,
    /// Session the command targets.
    pub session_code: String,
    /// Role of the issuer.
    pub issued_by_role: Role,
    /// Identifier of the issuer; doubles as the audience id for answers.
    pub issued_by_id: String,
    /// Client-side issue timestamp.
    pub issued_at: OffsetDateTime,
    /// What the command asks for.
    pub kind: CommandKind,
}

impl Command {
    /// Shorthand for `self.kind.name()`.
    pub fn name(&self) -> CommandName {
        self.kind.name()
    }
}

/// Fact produced once a command has been validated; consumed by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: Uuid,
    /// Id of the command that started the causal chain.
    pub correlation_id: Uuid,
    pub caused_by_command_id: Uuid,
    pub session_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub emitted_at_utc: OffsetDateTime,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Build an event directly caused by `command`.
    pub fn caused_by(command: &Command, payload: EventPayload, emitted_at: OffsetDateTime) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            correlation_id: command.id,
            caused_by_command_id: command.id,
            session_code: command.session_code.clone(),
            emitted_at_utc: emitted_at,
            payload,
        }
    }

    /// Name of the event type, used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Domain payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// The catalog was loaded and the lobby opened.
    SessionCreated {
        /// Songs of the show.
        catalog: Vec<Song>,
    },
    /// The session moved from one phase to another.
    #[serde(rename_all = "camelCase")]
    GamePhaseChanged {
        /// Phase the emitter believed the session was in.
        current_phase: Phase,
        /// Phase the session moves to.
        new_phase: Phase,
    },
    /// One more hint was revealed.
    #[serde(rename_all = "camelCase")]
    HintGiven {
        /// Number of hints revealed so far, including this one.
        hint_index: usize,
    },
    /// An audience member picked a choice.
    #[serde(rename_all = "camelCase")]
    AnswerSubmitted {
        /// Stable identifier of the audience member.
        audience_id: String,
        /// Index into the current song's choices.
        choice_index: usize,
    },
    /// The correct choice was revealed.
    #[serde(rename_all = "camelCase")]
    CorrectAnswerRevealed {
        /// Index into the current song's choices.
        choice_index: usize,
    },
    /// The song cursor moved.
    #[serde(rename_all = "camelCase")]
    SongAdvanced {
        /// New zero-based song index.
        song_index: usize,
    },
}

impl EventPayload {
    /// Wire name of the payload type.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::SessionCreated { .. } => "SessionCreated",
            EventPayload::GamePhaseChanged { .. } => "GamePhaseChanged",
            EventPayload::HintGiven { .. } => "HintGiven",
            EventPayload::AnswerSubmitted { .. } => "AnswerSubmitted",
            EventPayload::CorrectAnswerRevealed { .. } => "CorrectAnswerRevealed",
            EventPayload::SongAdvanced { .. } => "SongAdvanced",
        }
    }
}
