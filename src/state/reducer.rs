//! Pure state transitions of a session.
//!
//! [`reduce`] never mutates its input and never panics. Rejections come back as
//! [`ReduceError`]; events that are structurally valid but irrelevant for the
//! current state come back as [`Reduction::Ignored`].

use thiserror::Error;

use crate::state::{
    envelope::{Event, EventPayload, Song},
    game::GameStateSnapshot,
    phase::Phase,
};

/// Successful outcome of a reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// The event produced a new state.
    Applied(GameStateSnapshot),
    /// The event is valid but changes nothing.
    Ignored(IgnoreReason),
}

/// Why an event left the state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Answers are only recorded while guessing.
    NotAcceptingAnswers(Phase),
    /// Choice index outside the current song's choices.
    ChoiceOutOfRange {
        /// Index carried by the event.
        index: usize,
        /// Number of choices of the current song.
        choices: usize,
    },
    /// The current song has no more hints.
    HintsExhausted {
        /// Hint index carried by the event.
        index: usize,
        /// Number of hints of the current song.
        available: usize,
    },
    /// Song index outside the catalog.
    SongOutOfRange {
        /// Index carried by the event.
        index: usize,
        /// Catalog size.
        catalog: usize,
    },
}

/// Event rejected because it contradicts the stored state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    /// The event was built against a phase the session is no longer in.
    #[error("phase_mismatch: stored phase is {stored}, event expected {claimed}")]
    PhaseMismatch {
        /// Phase of the stored state.
        stored: Phase,
        /// Phase the event claims the session is in.
        claimed: Phase,
    },
}

impl ReduceError {
    /// Machine-readable reason code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ReduceError::PhaseMismatch { .. } => "phase_mismatch",
        }
    }
}

/// Apply `event` to `state`.
pub fn reduce(state: &GameStateSnapshot, event: &Event) -> Result<Reduction, ReduceError> {
    match &event.payload {
        EventPayload::SessionCreated { catalog } => create_session(state, catalog),
        EventPayload::GamePhaseChanged {
            current_phase,
            new_phase,
        } => change_phase(state, *current_phase, *new_phase, event),
        EventPayload::HintGiven { hint_index } => Ok(give_hint(state, *hint_index)),
        EventPayload::AnswerSubmitted {
            audience_id,
            choice_index,
        } => Ok(submit_answer(state, audience_id, *choice_index)),
        EventPayload::CorrectAnswerRevealed { choice_index } => {
            Ok(reveal_answer(state, *choice_index))
        }
        EventPayload::SongAdvanced { song_index } => Ok(advance_song(state, *song_index)),
    }
}

fn create_session(state: &GameStateSnapshot, catalog: &[Song]) -> Result<Reduction, ReduceError> {
    if state.phase != Phase::Idle {
        return Err(ReduceError::PhaseMismatch {
            stored: state.phase,
            claimed: Phase::Idle,
        });
    }

    let mut next = state.clone();
    next.catalog = catalog.to_vec().into();
    next.song_index = 0;
    next.phase = Phase::Lobby;
    Ok(Reduction::Applied(next))
}

fn change_phase(
    state: &GameStateSnapshot,
    current: Phase,
    new: Phase,
    event: &Event,
) -> Result<Reduction, ReduceError> {
    if state.phase != current {
        return Err(ReduceError::PhaseMismatch {
            stored: state.phase,
            claimed: current,
        });
    }

    let mut next = state.clone();
    next.phase = new;

    if new.is_song_start() {
        let song = next.catalog.get(next.song_index).cloned();
        next.choices = song
            .as_ref()
            .map(|song| song.choices.clone())
            .unwrap_or_default();
        next.current_song = song;
        next.tallies = vec![0; next.choices.len()];
        next.latest_answers.clear();
        next.hint_index = 0;
        next.song_started_at = Some(event.emitted_at_utc);
    }

    Ok(Reduction::Applied(next))
}

fn give_hint(state: &GameStateSnapshot, hint_index: usize) -> Reduction {
    let available = state.current_hints().len();
    if hint_index > available {
        return Reduction::Ignored(IgnoreReason::HintsExhausted {
            index: hint_index,
            available,
        });
    }

    let mut next = state.clone();
    next.hint_index = hint_index;
    Reduction::Applied(next)
}

fn submit_answer(state: &GameStateSnapshot, audience_id: &str, choice_index: usize) -> Reduction {
    // Unreachable through commands while the guard restricts answers to
    // Guessing; events replayed against a later phase still land here.
    if !state.phase.accepts_answers() {
        return Reduction::Ignored(IgnoreReason::NotAcceptingAnswers(state.phase));
    }
    if choice_index >= state.choices.len() {
        return Reduction::Ignored(IgnoreReason::ChoiceOutOfRange {
            index: choice_index,
            choices: state.choices.len(),
        });
    }

    let mut next = state.clone();
    if let Some(count) = next.tallies.get_mut(choice_index) {
        *count += 1;
    }
    // Only the latest choice is scored on reveal.
    next.latest_answers
        .insert(audience_id.to_string(), choice_index);
    Reduction::Applied(next)
}

fn reveal_answer(state: &GameStateSnapshot, choice_index: usize) -> Reduction {
    if choice_index >= state.choices.len() {
        return Reduction::Ignored(IgnoreReason::ChoiceOutOfRange {
            index: choice_index,
            choices: state.choices.len(),
        });
    }

    let mut winners: Vec<&String> = state
        .latest_answers
        .iter()
        .filter(|(_, choice)| **choice == choice_index)
        .map(|(player, _)| player)
        .collect();
    // Deterministic insertion order for first-time scorers.
    winners.sort();

    let mut next = state.clone();
    for player in winners {
        *next.scores.entry(player.clone()).or_insert(0) += 1;
    }
    Reduction::Applied(next)
}

fn advance_song(state: &GameStateSnapshot, song_index: usize) -> Reduction {
    if song_index >= state.catalog.len() {
        return Reduction::Ignored(IgnoreReason::SongOutOfRange {
            index: song_index,
            catalog: state.catalog.len(),
        });
    }

    let mut next = state.clone();
    next.song_index = song_index;
    Reduction::Applied(next)
}
