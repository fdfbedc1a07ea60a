//! Turning a command into the chain of events it causes, and applying that chain.

use thiserror::Error;
use time::OffsetDateTime;

use crate::state::{
    envelope::{Command, CommandKind, Event, EventPayload},
    game::GameStateSnapshot,
    guard::{self, PhaseViolation},
    phase::Phase,
    reducer::{IgnoreReason, ReduceError, Reduction, reduce},
};

/// Why a command was refused. The stored state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejection {
    /// The command is not legal in the current phase.
    #[error(transparent)]
    Phase(#[from] PhaseViolation),
    /// An event of the chain contradicts the stored state.
    #[error(transparent)]
    Reducer(#[from] ReduceError),
}

impl CommandRejection {
    /// Machine-readable reason code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CommandRejection::Phase(_) => PhaseViolation::CODE,
            CommandRejection::Reducer(err) => err.code(),
        }
    }
}

/// Result of running a legal command against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Snapshot after every applied event; `None` when nothing applied.
    pub next: Option<GameStateSnapshot>,
    /// Events that changed the state, in application order.
    pub applied: Vec<Event>,
    /// Events of the chain that were no-ops.
    pub ignored: Vec<(Event, IgnoreReason)>,
}

/// Events `command` causes when issued against `snapshot`, in order.
///
/// Phase-change events name the phase the session is expected to be in when
/// they are reduced, so a chain stays consistent even after an earlier event of
/// the same chain moved the phase.
pub fn plan_events(snapshot: &GameStateSnapshot, command: &Command) -> Vec<EventPayload> {
    let current = snapshot.phase;
    let change = |from: Phase, to: Phase| EventPayload::GamePhaseChanged {
        current_phase: from,
        new_phase: to,
    };

    match &command.kind {
        CommandKind::CreateSession { catalog } => vec![EventPayload::SessionCreated {
            catalog: catalog.clone(),
        }],
        CommandKind::StartGame => vec![change(current, Phase::Start)],
        CommandKind::GiveHint => {
            let hint = EventPayload::HintGiven {
                hint_index: snapshot.hint_index + 1,
            };
            if current == Phase::Start {
                vec![change(Phase::Start, Phase::Hint), hint]
            } else {
                vec![hint]
            }
        }
        CommandKind::OpenGuessing => vec![change(current, Phase::Guessing)],
        CommandKind::SubmitAnswer { choice_index } => vec![EventPayload::AnswerSubmitted {
            audience_id: command.issued_by_id.clone(),
            choice_index: *choice_index,
        }],
        CommandKind::LockAnswers => vec![change(current, Phase::Lock)],
        CommandKind::RevealAnswer {
            correct_choice_index,
        } => vec![
            change(current, Phase::Reveal),
            EventPayload::CorrectAnswerRevealed {
                choice_index: *correct_choice_index,
            },
        ],
        CommandKind::PlaySong => vec![change(current, Phase::Play)],
        CommandKind::EndSong => vec![change(current, Phase::Intermission)],
        CommandKind::NextRound => match current {
            Phase::Lobby => vec![EventPayload::SongAdvanced { song_index: 0 }],
            _ if snapshot.has_next_song() => vec![
                EventPayload::SongAdvanced {
                    song_index: snapshot.song_index + 1,
                },
                change(current, Phase::Start),
            ],
            _ => vec![change(current, Phase::Finished)],
        },
    }
}

/// Check `command` against the phase rules, then plan and reduce its events on
/// a working copy of `snapshot`.
///
/// All or nothing: if any event of the chain is rejected, no event applies.
pub fn execute(
    snapshot: &GameStateSnapshot,
    command: &Command,
    now: OffsetDateTime,
) -> Result<Execution, CommandRejection> {
    guard::ensure_legal(snapshot.phase, command)?;

    let mut working: Option<GameStateSnapshot> = None;
    let mut applied = Vec::new();
    let mut ignored = Vec::new();

    for payload in plan_events(snapshot, command) {
        let event = Event::caused_by(command, payload, now);
        let current = working.as_ref().unwrap_or(snapshot);
        match reduce(current, &event)? {
            Reduction::Applied(next) => {
                working = Some(next);
                applied.push(event);
            }
            Reduction::Ignored(reason) => ignored.push((event, reason)),
        }
    }

    Ok(Execution {
        next: working,
        applied,
        ignored,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::state::{
        envelope::{Role, Song},
        guard::ViolationKind,
    };

    const NOW: OffsetDateTime = datetime!(2026-10-17 20:00 UTC);

    fn song(id: &str, hints: usize) -> Song {
        Song {
            id: id.into(),
            title: id.into(),
            artist: None,
            choices: vec!["a".into(), "b".into(), "c".into()],
            hints: (0..hints).map(|i| format!("hint {i}")).collect(),
            media_url: None,
        }
    }

    fn command(kind: CommandKind) -> Command {
        Command {
            id: Uuid::new_v4(),
            session_code: "QUIZ42".into(),
            issued_by_role: Role::Performer,
            issued_by_id: "host".into(),
            issued_at: NOW,
            kind,
        }
    }

    fn run(snapshot: &GameStateSnapshot, kind: CommandKind) -> GameStateSnapshot {
        execute(snapshot, &command(kind), NOW)
            .unwrap()
            .next
            .expect("command should change the state")
    }

    fn lobby(songs: usize) -> GameStateSnapshot {
        run(
            &GameStateSnapshot::new("QUIZ42"),
            CommandKind::CreateSession {
                catalog: (0..songs).map(|i| song(&format!("s{i}"), 1)).collect(),
            },
        )
    }

    #[test]
    fn chain_events_share_the_command_as_correlation() {
        let state = lobby(1);
        let state = run(&state, CommandKind::StartGame);
        let cmd = command(CommandKind::GiveHint);

        let execution = execute(&state, &cmd, NOW).unwrap();

        assert_eq!(execution.applied.len(), 2);
        for event in &execution.applied {
            assert_eq!(event.correlation_id, cmd.id);
            assert_eq!(event.caused_by_command_id, cmd.id);
        }
        let next = execution.next.unwrap();
        assert_eq!(next.phase, Phase::Hint);
        assert_eq!(next.hint_index, 1);
    }

    #[test]
    fn guard_rejects_before_planning() {
        let state = lobby(1);
        let err = execute(&state, &command(CommandKind::LockAnswers), NOW).unwrap_err();
        match &err {
            CommandRejection::Phase(violation) => {
                assert_eq!(violation.current, Phase::Lobby);
                assert_eq!(violation.kind, ViolationKind::NotAllowedInPhase);
            }
            other => panic!("unexpected rejection: {other:?}"),
        }
        assert_eq!(err.code(), "phase_violation");
    }

    #[test]
    fn exhausted_hints_are_ignored_without_touching_state() {
        let state = lobby(1);
        let state = run(&state, CommandKind::StartGame);
        let state = run(&state, CommandKind::GiveHint);

        let execution = execute(&state, &command(CommandKind::GiveHint), NOW).unwrap();

        assert!(execution.next.is_none());
        assert!(execution.applied.is_empty());
        assert!(matches!(
            execution.ignored.as_slice(),
            [(_, IgnoreReason::HintsExhausted { index: 2, available: 1 })]
        ));
    }

    #[test]
    fn next_round_advances_then_restarts() {
        let mut state = lobby(2);
        state.phase = Phase::Intermission;

        let planned = plan_events(&state, &command(CommandKind::NextRound));
        assert_eq!(
            planned,
            vec![
                EventPayload::SongAdvanced { song_index: 1 },
                EventPayload::GamePhaseChanged {
                    current_phase: Phase::Intermission,
                    new_phase: Phase::Start,
                },
            ]
        );

        let next = run(&state, CommandKind::NextRound);
        assert_eq!(next.phase, Phase::Start);
        assert_eq!(next.song_index, 1);
        assert_eq!(next.current_song.as_ref().map(|s| s.id.as_str()), Some("s1"));
    }

    #[test]
    fn next_round_after_last_song_finishes() {
        let mut state = lobby(1);
        state.phase = Phase::Intermission;

        let next = run(&state, CommandKind::NextRound);
        assert_eq!(next.phase, Phase::Finished);
        assert_eq!(next.song_index, 0);
    }

    #[test]
    fn next_round_in_lobby_rearms_first_song() {
        let mut state = lobby(2);
        state.song_index = 1;
        let next = run(&state, CommandKind::NextRound);
        assert_eq!(next.phase, Phase::Lobby);
        assert_eq!(next.song_index, 0);
    }

    #[test]
    fn answers_are_keyed_by_issuer() {
        let mut state = lobby(1);
        state = run(&state, CommandKind::StartGame);
        state = run(&state, CommandKind::OpenGuessing);

        let mut answer = command(CommandKind::SubmitAnswer { choice_index: 1 });
        answer.issued_by_role = Role::Audience;
        answer.issued_by_id = "p1".into();
        let next = execute(&state, &answer, NOW).unwrap().next.unwrap();

        assert_eq!(next.latest_answer("p1"), Some(1));
        assert_eq!(next.tallies, vec![0, 1, 0]);
    }

    #[test]
    fn reveal_changes_phase_even_when_index_is_out_of_range() {
        let mut state = lobby(1);
        state = run(&state, CommandKind::StartGame);
        state = run(&state, CommandKind::OpenGuessing);
        state = run(&state, CommandKind::LockAnswers);

        let execution = execute(
            &state,
            &command(CommandKind::RevealAnswer {
                correct_choice_index: 9,
            }),
            NOW,
        )
        .unwrap();

        assert_eq!(execution.applied.len(), 1);
        assert_eq!(execution.ignored.len(), 1);
        assert_eq!(execution.next.unwrap().phase, Phase::Reveal);
    }

    #[test]
    fn creating_twice_is_rejected() {
        let mut state = GameStateSnapshot::new("QUIZ42");
        state.catalog = Arc::from(vec![song("s0", 0)]);
        state.phase = Phase::Lobby;
        let err = execute(
            &state,
            &command(CommandKind::CreateSession { catalog: vec![] }),
            NOW,
        )
        .unwrap_err();
        assert_eq!(err.code(), "phase_violation");
    }
}
