use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle phases a quiz session moves through.
///
/// The happy path is `Lobby → Start → Hint → Guessing → Lock → Reveal → Play →
/// Intermission`, looping back to `Start` for every song until `Finished`.
/// Which edges are legal is declared per command by the phase guard, so the
/// ordering exposed here is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Phase {
    /// Session code reserved but no show has been created yet.
    Idle,
    /// Catalog loaded, waiting for the performer to start the game.
    Lobby,
    /// A new song has been opened; tallies were reset.
    Start,
    /// At least one hint has been given for the current song.
    Hint,
    /// The audience may submit answers.
    Guessing,
    /// Answers are locked, nothing can be submitted anymore.
    Lock,
    /// The correct choice has been revealed and scored.
    Reveal,
    /// The song is being played back in full.
    Play,
    /// Pause between two songs.
    Intermission,
    /// The catalog has been exhausted.
    Finished,
}

impl Phase {
    /// Every phase in happy-path order.
    pub const ALL: [Phase; 10] = [
        Phase::Idle,
        Phase::Lobby,
        Phase::Start,
        Phase::Hint,
        Phase::Guessing,
        Phase::Lock,
        Phase::Reveal,
        Phase::Play,
        Phase::Intermission,
        Phase::Finished,
    ];

    /// Position of the phase on the happy path.
    pub fn ordinal(self) -> usize {
        match self {
            Phase::Idle => 0,
            Phase::Lobby => 1,
            Phase::Start => 2,
            Phase::Hint => 3,
            Phase::Guessing => 4,
            Phase::Lock => 5,
            Phase::Reveal => 6,
            Phase::Play => 7,
            Phase::Intermission => 8,
            Phase::Finished => 9,
        }
    }

    /// True for phases that belong to a song currently being played
    /// (between `Start` and `Play`, inclusive).
    pub fn is_in_song(self) -> bool {
        (Phase::Start.ordinal()..=Phase::Play.ordinal()).contains(&self.ordinal())
    }

    /// Entering this phase opens a new song and resets the per-song counters.
    pub fn is_song_start(self) -> bool {
        matches!(self, Phase::Start)
    }

    /// Only this phase records audience answers.
    pub fn accepts_answers(self) -> bool {
        matches!(self, Phase::Guessing)
    }

    /// Phase reached next on the happy path, if any. `Intermission` loops back
    /// to `Start`; whether the show finishes instead depends on the catalog.
    pub fn happy_path_successor(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Lobby),
            Phase::Lobby => Some(Phase::Start),
            Phase::Start => Some(Phase::Hint),
            Phase::Hint => Some(Phase::Guessing),
            Phase::Guessing => Some(Phase::Lock),
            Phase::Lock => Some(Phase::Reveal),
            Phase::Reveal => Some(Phase::Play),
            Phase::Play => Some(Phase::Intermission),
            Phase::Intermission => Some(Phase::Start),
            Phase::Finished => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
