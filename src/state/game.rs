use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use time::OffsetDateTime;

use crate::state::{envelope::Song, phase::Phase};

/// Authoritative per-session game state. Only the reducer produces new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateSnapshot {
    /// Session this state belongs to.
    pub session_code: String,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Zero-based index of the current song in the catalog.
    pub song_index: usize,
    /// Song opened by the last transition into [`Phase::Start`].
    pub current_song: Option<Song>,
    /// Songs of the show; immutable once the session is created.
    pub catalog: Arc<[Song]>,
    /// Answer options of the current song.
    pub choices: Vec<String>,
    /// Number of hints revealed for the current song.
    pub hint_index: usize,
    /// Answer count per choice, parallel to `choices`.
    pub tallies: Vec<u32>,
    /// Cumulative points per audience member.
    pub scores: IndexMap<String, u32>,
    /// Latest choice per audience member for the current song. Server-internal,
    /// only used to score reveals.
    pub(crate) latest_answers: HashMap<String, usize>,
    /// When the current song was opened.
    pub song_started_at: Option<OffsetDateTime>,
}

impl GameStateSnapshot {
    /// Fresh state for a session nobody has created yet.
    pub fn new(session_code: impl Into<String>) -> Self {
        Self {
            session_code: session_code.into(),
            phase: Phase::Idle,
            song_index: 0,
            current_song: None,
            catalog: Vec::new().into(),
            choices: Vec::new(),
            hint_index: 0,
            tallies: Vec::new(),
            scores: IndexMap::new(),
            latest_answers: HashMap::new(),
            song_started_at: None,
        }
    }

    /// Latest choice submitted by `audience_id` for the current song.
    pub fn latest_answer(&self, audience_id: &str) -> Option<usize> {
        self.latest_answers.get(audience_id).copied()
    }

    /// Number of audience members who answered the current song.
    pub fn answer_count(&self) -> usize {
        self.latest_answers.len()
    }

    /// Points of `player_id`, if they ever scored.
    pub fn score_of(&self, player_id: &str) -> Option<u32> {
        self.scores.get(player_id).copied()
    }

    /// Whether another song follows the current one.
    pub fn has_next_song(&self) -> bool {
        self.song_index + 1 < self.catalog.len()
    }

    /// Hints of the current song.
    pub fn current_hints(&self) -> &[String] {
        self.current_song
            .as_ref()
            .map(|song| song.hints.as_slice())
            .unwrap_or_default()
    }
}
