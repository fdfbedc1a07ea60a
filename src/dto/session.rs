use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::state::{
    connections::RoleCounts,
    envelope::{Role, Song},
    game::GameStateSnapshot,
    phase::Phase,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Song as shown to connected clients. Hints are exposed separately, once revealed.
pub struct SongView {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl From<&Song> for SongView {
    fn from(song: &Song) -> Self {
        Self {
            id: song.id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            media_url: song.media_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast projection of a session snapshot.
///
/// Never carries individual answers.
pub struct GameStateView {
    pub session_code: String,
    pub phase: Phase,
    /// Incremented every time a command changes the state.
    pub version: u64,
    pub song_index: usize,
    pub catalog_size: usize,
    pub current_song: Option<SongView>,
    pub choices: Vec<String>,
    pub hint_index: usize,
    /// Hints revealed so far for the current song.
    pub revealed_hints: Vec<String>,
    pub tallies: Vec<u32>,
    /// Number of audience members who answered the current song.
    pub answer_count: usize,
    #[schema(value_type = Object)]
    pub scores: IndexMap<String, u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub song_started_at_utc: Option<OffsetDateTime>,
}

impl GameStateView {
    /// Project `snapshot` stored at `version`.
    pub fn new(snapshot: &GameStateSnapshot, version: u64) -> Self {
        let hints = snapshot.current_hints();
        let revealed = snapshot.hint_index.min(hints.len());
        Self {
            session_code: snapshot.session_code.clone(),
            phase: snapshot.phase,
            version,
            song_index: snapshot.song_index,
            catalog_size: snapshot.catalog.len(),
            current_song: snapshot.current_song.as_ref().map(SongView::from),
            choices: snapshot.choices.clone(),
            hint_index: snapshot.hint_index,
            revealed_hints: hints[..revealed].to_vec(),
            tallies: snapshot.tallies.clone(),
            answer_count: snapshot.answer_count(),
            scores: snapshot.scores.clone(),
            song_started_at_utc: snapshot.song_started_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Live connections of a session, per role.
pub struct ConnectionCountsResponse {
    pub session_code: String,
    pub performer: usize,
    pub projector: usize,
    pub engine: usize,
    pub audience: usize,
    pub total: usize,
    /// Critical roles nobody is connected as.
    pub missing_critical_roles: Vec<Role>,
}

impl ConnectionCountsResponse {
    /// Build the response for `session_code`.
    pub fn new(session_code: impl Into<String>, counts: RoleCounts) -> Self {
        Self {
            session_code: session_code.into(),
            performer: counts.performer,
            projector: counts.projector,
            engine: counts.engine,
            audience: counts.audience,
            total: counts.total(),
            missing_critical_roles: counts.missing_critical_roles(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
/// Query parameters identifying a streaming client.
pub struct ConnectParams {
    /// Role the client connects as.
    pub role: Role,
    /// Optional display name.
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn song() -> Song {
        Song {
            id: "s1".into(),
            title: "Intro".into(),
            artist: Some("Band".into()),
            choices: vec!["a".into(), "b".into()],
            hints: vec!["first".into(), "second".into()],
            media_url: None,
        }
    }

    #[test]
    fn view_hides_answers_and_unrevealed_hints() {
        let mut snapshot = GameStateSnapshot::new("QUIZ42");
        snapshot.phase = Phase::Guessing;
        snapshot.catalog = Arc::from(vec![song()]);
        snapshot.current_song = Some(song());
        snapshot.choices = song().choices;
        snapshot.tallies = vec![1, 0];
        snapshot.hint_index = 1;
        snapshot.latest_answers.insert("p1".into(), 0);

        let view = GameStateView::new(&snapshot, 7);
        assert_eq!(view.revealed_hints, vec!["first".to_string()]);
        assert_eq!(view.answer_count, 1);
        assert_eq!(view.version, 7);

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["phase"], "Guessing");
        assert_eq!(value["currentSong"]["title"], "Intro");
        assert!(value.get("latestAnswers").is_none());
        assert!(value["currentSong"].get("hints").is_none());
        assert_eq!(value["songStartedAtUtc"], serde_json::Value::Null);
    }

    #[test]
    fn counts_response_lists_missing_roles() {
        let response = ConnectionCountsResponse::new(
            "QUIZ42",
            RoleCounts {
                performer: 1,
                audience: 3,
                ..RoleCounts::default()
            },
        );
        assert_eq!(response.total, 4);
        assert_eq!(
            response.missing_critical_roles,
            vec![Role::Projector, Role::Engine]
        );
    }
}
