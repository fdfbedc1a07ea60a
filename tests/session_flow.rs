use std::sync::Arc;

use time::{OffsetDateTime, macros::datetime};
use tokio::sync::broadcast::error::TryRecvError;
use trivia_live_back::{
    config::AppConfig,
    error::ServiceError,
    state::{
        AppState, CommandOutcome, SharedState,
        envelope::{Command, CommandKind, Role, Song},
        phase::Phase,
        transitions::CommandRejection,
    },
};
use uuid::Uuid;

const T0: OffsetDateTime = datetime!(2026-10-17 20:00 UTC);
const CODE: &str = "SHOW01";

fn state() -> SharedState {
    let config = AppConfig::from_json_str(
        r#"{"session_idle_timeout_secs": 120, "broadcast_capacity": 512}"#,
    )
    .unwrap();
    AppState::new(config)
}

fn song(id: &str, hints: usize) -> Song {
    Song {
        id: id.into(),
        title: format!("Song {id}"),
        artist: Some("Band".into()),
        choices: vec!["red".into(), "green".into(), "blue".into()],
        hints: (0..hints).map(|i| format!("hint {i}")).collect(),
        media_url: None,
    }
}

fn issued_by(role: Role, id: &str, kind: CommandKind) -> Command {
    Command {
        id: Uuid::new_v4(),
        session_code: CODE.into(),
        issued_by_role: role,
        issued_by_id: id.into(),
        issued_at: T0,
        kind,
    }
}

fn host(kind: CommandKind) -> Command {
    issued_by(Role::Performer, "host", kind)
}

fn answer(player: &str, choice_index: usize) -> Command {
    issued_by(Role::Audience, player, CommandKind::SubmitAnswer { choice_index })
}

async fn apply(state: &SharedState, command: Command) -> Phase {
    match state.run_command_at(&command, T0).await {
        Ok(CommandOutcome::Accepted(accepted)) => accepted.snapshot.phase,
        other => panic!("{} was not accepted: {other:?}", command.name()),
    }
}

async fn play_round(state: &SharedState, answers: &[(&str, usize)], correct: usize) {
    assert_eq!(apply(state, host(CommandKind::OpenGuessing)).await, Phase::Guessing);
    for (player, choice) in answers {
        apply(state, answer(player, *choice)).await;
    }
    assert_eq!(apply(state, host(CommandKind::LockAnswers)).await, Phase::Lock);
    assert_eq!(
        apply(
            state,
            host(CommandKind::RevealAnswer {
                correct_choice_index: correct
            })
        )
        .await,
        Phase::Reveal
    );
    assert_eq!(apply(state, host(CommandKind::PlaySong)).await, Phase::Play);
    assert_eq!(apply(state, host(CommandKind::EndSong)).await, Phase::Intermission);
}

#[tokio::test]
async fn full_show_runs_to_the_end_and_scores() {
    let state = state();

    let create = host(CommandKind::CreateSession {
        catalog: vec![song("a", 2), song("b", 0)],
    });
    assert_eq!(apply(&state, create).await, Phase::Lobby);
    assert_eq!(apply(&state, host(CommandKind::StartGame)).await, Phase::Start);
    assert_eq!(apply(&state, host(CommandKind::GiveHint)).await, Phase::Hint);

    play_round(&state, &[("ana", 1), ("bob", 0), ("cid", 1)], 1).await;

    assert_eq!(apply(&state, host(CommandKind::NextRound)).await, Phase::Start);
    let (snapshot, _) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.song_index, 1);
    assert_eq!(snapshot.tallies, vec![0, 0, 0]);
    assert_eq!(snapshot.current_song.as_ref().map(|song| song.id.as_str()), Some("b"));

    play_round(&state, &[("bob", 2), ("ana", 2)], 2).await;

    assert_eq!(apply(&state, host(CommandKind::NextRound)).await, Phase::Finished);

    let (snapshot, version) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.score_of("ana"), Some(2));
    assert_eq!(snapshot.score_of("bob"), Some(1));
    assert_eq!(snapshot.score_of("cid"), Some(1));
    assert!(version > 10);

    let err = state
        .run_command_at(&host(CommandKind::NextRound), T0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Rejected(CommandRejection::Phase(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_start_sent_concurrently_applies_once() {
    let state = state();
    apply(
        &state,
        host(CommandKind::CreateSession {
            catalog: vec![song("a", 0)],
        }),
    )
    .await;
    let (mut receiver, view) = state.subscribe(CODE).await.unwrap();
    assert_eq!(view.phase, Phase::Lobby);

    let start = host(CommandKind::StartGame);
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let state = Arc::clone(&state);
            let start = start.clone();
            tokio::spawn(async move { state.run_command_at(&start, T0).await })
        })
        .collect();

    let mut accepted = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(CommandOutcome::Accepted(_)) => accepted += 1,
            Ok(CommandOutcome::Duplicate) => duplicates += 1,
            Err(err) => panic!("unexpected rejection: {err:?}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 99);

    let mut phase_changes = 0;
    loop {
        match receiver.try_recv() {
            Ok(event) if event.event.as_deref() == Some("GamePhaseChanged") => phase_changes += 1,
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(other) => panic!("unexpected receive error: {other:?}"),
        }
    }
    assert_eq!(phase_changes, 1);
    assert_eq!(state.snapshot(CODE).await.unwrap().1, 2);
}

#[tokio::test]
async fn distinct_starts_sent_concurrently_apply_once() {
    let state = state();
    apply(
        &state,
        host(CommandKind::CreateSession {
            catalog: vec![song("a", 0)],
        }),
    )
    .await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                state
                    .run_command_at(&host(CommandKind::StartGame), T0)
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(CommandOutcome::Accepted(_)) => accepted += 1,
            Err(ServiceError::Rejected(_)) => rejected += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(rejected, 19);
}

#[tokio::test]
async fn concurrent_answers_are_all_counted() {
    let state = state();
    apply(
        &state,
        host(CommandKind::CreateSession {
            catalog: vec![song("a", 0)],
        }),
    )
    .await;
    apply(&state, host(CommandKind::StartGame)).await;
    apply(&state, host(CommandKind::OpenGuessing)).await;
    let (_, before) = state.snapshot(CODE).await.unwrap();

    let handles: Vec<_> = (0..60)
        .map(|i| {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                state
                    .run_command_at(&answer(&format!("player-{i}"), i % 3), T0)
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            Ok(CommandOutcome::Accepted(_))
        ));
    }

    let (snapshot, after) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.tallies, vec![20, 20, 20]);
    assert_eq!(snapshot.answer_count(), 60);
    assert_eq!(after, before + 60);
}

#[tokio::test]
async fn rejected_command_can_be_retried_later() {
    let state = state();
    apply(
        &state,
        host(CommandKind::CreateSession {
            catalog: vec![song("a", 0)],
        }),
    )
    .await;

    let early = host(CommandKind::OpenGuessing);
    let err = state.run_command_at(&early, T0).await.unwrap_err();
    assert_eq!(err.code(), "phase_violation");
    let (snapshot, version) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Lobby);
    assert_eq!(version, 1);

    apply(&state, host(CommandKind::StartGame)).await;
    // Same command id: the rejection did not consume it.
    assert_eq!(apply(&state, early).await, Phase::Guessing);
}

#[tokio::test]
async fn every_answer_is_tallied_but_only_the_latest_scores() {
    let state = state();
    apply(
        &state,
        host(CommandKind::CreateSession {
            catalog: vec![song("a", 0)],
        }),
    )
    .await;
    apply(&state, host(CommandKind::StartGame)).await;
    apply(&state, host(CommandKind::OpenGuessing)).await;

    apply(&state, answer("ana", 0)).await;
    apply(&state, answer("ana", 2)).await;
    apply(&state, answer("ana", 2)).await;

    let (snapshot, _) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.tallies, vec![1, 0, 2]);
    assert_eq!(snapshot.latest_answer("ana"), Some(2));

    apply(&state, host(CommandKind::LockAnswers)).await;
    apply(
        &state,
        host(CommandKind::RevealAnswer {
            correct_choice_index: 2,
        }),
    )
    .await;
    let (snapshot, _) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.score_of("ana"), Some(1));
}

#[tokio::test]
async fn idle_sessions_are_evicted_and_streams_closed() {
    let state = state();
    state
        .run_command_at(
            &host(CommandKind::CreateSession {
                catalog: vec![song("a", 0)],
            }),
            T0,
        )
        .await
        .unwrap();
    let (mut receiver, _) = state.subscribe(CODE).await.unwrap();

    assert!(state.sweep_idle_sessions_at(T0 + time::Duration::seconds(60)).is_empty());
    // subscribe() touched the lane with the wall clock.
    let later = T0.max(OffsetDateTime::now_utc()) + time::Duration::seconds(121);
    assert_eq!(state.sweep_idle_sessions_at(later), vec![CODE.to_string()]);

    let closed = receiver.recv().await.unwrap();
    assert!(closed.closes_session());
    assert!(closed.data.contains("\"idle\""));
    assert!(!state.has_session(CODE));
    assert!(state.idempotency().is_empty(CODE));

    let (snapshot, version) = state.snapshot(CODE).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(version, 0);
}
