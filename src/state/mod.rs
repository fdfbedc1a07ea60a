pub mod connections;
pub mod envelope;
pub mod game;
pub mod guard;
pub mod hub;
pub mod idempotency;
pub mod lane;
pub mod phase;
pub mod reducer;
pub mod transitions;

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{sync::broadcast, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dto::{
        session::GameStateView,
        sse::{CloseReason, ServerEvent},
    },
    error::ServiceError,
    services::sse_events,
    state::{
        connections::ConnectionStore,
        envelope::{Command, Event, EventPayload},
        game::GameStateSnapshot,
        idempotency::IdempotencyStore,
        lane::SessionLane,
        reducer::IgnoreReason,
    },
};

/// Shared handle to [`AppState`] passed to handlers and background tasks.
pub type SharedState = Arc<AppState>;

/// Outcome of a command that was not rejected.
#[derive(Debug)]
pub enum CommandOutcome {
    /// First time this command id was seen within the idempotency window.
    Accepted(AcceptedCommand),
    /// Already processed; nothing was applied or broadcast.
    Duplicate,
}

/// Details of a command that went through the pipeline.
#[derive(Debug)]
pub struct AcceptedCommand {
    /// Events that changed the state, in application order.
    pub applied: Vec<Event>,
    /// Events of the chain that were no-ops.
    pub ignored: Vec<(Event, IgnoreReason)>,
    /// Stored snapshot once the command completed.
    pub snapshot: GameStateSnapshot,
    /// Version of `snapshot`.
    pub version: u64,
}

/// Central application state holding every live session.
pub struct AppState {
    config: AppConfig,
    lanes: DashMap<String, Arc<SessionLane>>,
    idempotency: IdempotencyStore,
    connections: ConnectionStore,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            idempotency: IdempotencyStore::new(
                config.idempotency_ttl(),
                config.idempotency_max_entries(),
            ),
            connections: ConnectionStore::new(),
            lanes: DashMap::new(),
            config,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live connections of every session.
    pub fn connections(&self) -> &ConnectionStore {
        &self.connections
    }

    /// Command deduplication records.
    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    /// Number of sessions with a game lane.
    pub fn session_count(&self) -> usize {
        self.lanes.len()
    }

    /// Whether `code` currently has a game lane.
    pub fn has_session(&self, code: &str) -> bool {
        self.lanes.contains_key(code)
    }

    /// Lane of `code`, created on first reference. Counts as activity.
    pub fn lane(&self, code: &str) -> Arc<SessionLane> {
        self.lane_at(code, OffsetDateTime::now_utc())
    }

    /// [`Self::lane`] with an explicit clock reading.
    pub fn lane_at(&self, code: &str, now: OffsetDateTime) -> Arc<SessionLane> {
        // Activity is recorded while the map entry is borrowed so the sweep
        // cannot evict the lane in between.
        if let Some(lane) = self.lanes.get(code) {
            lane.mark_active(now);
            return lane.value().clone();
        }
        let lane = self.lanes.entry(code.to_string()).or_insert_with(|| {
            debug!(session = code, "session lane created");
            Arc::new(SessionLane::new(
                code,
                self.config.broadcast_capacity(),
                now,
            ))
        });
        lane.mark_active(now);
        lane.value().clone()
    }

    /// Stored snapshot of `code` and its version.
    pub async fn snapshot(&self, code: &str) -> Result<(GameStateSnapshot, u64), ServiceError> {
        let lane = self.lane(code);
        timeout(self.config.command_timeout(), lane.read())
            .await
            .map_err(|_| ServiceError::Timeout)
    }

    /// Subscribe to `code` and return the snapshot the subscription starts from.
    ///
    /// Both are taken under the lane lock: every event received afterwards
    /// applies on top of the returned view.
    pub async fn subscribe(
        &self,
        code: &str,
    ) -> Result<(broadcast::Receiver<ServerEvent>, GameStateView), ServiceError> {
        let lane = self.lane(code);
        let guard = timeout(self.config.command_timeout(), lane.lock())
            .await
            .map_err(|_| ServiceError::Timeout)?;
        let receiver = lane.hub().subscribe();
        Ok((receiver, GameStateView::new(&guard.snapshot, guard.version)))
    }

    /// Run `command` through the session pipeline.
    pub async fn run_command(&self, command: &Command) -> Result<CommandOutcome, ServiceError> {
        self.run_command_at(command, OffsetDateTime::now_utc()).await
    }

    /// [`Self::run_command`] with an explicit clock reading.
    pub async fn run_command_at(
        &self,
        command: &Command,
        now: OffsetDateTime,
    ) -> Result<CommandOutcome, ServiceError> {
        let code = command.session_code.as_str();
        self.connections.mark_session_active_at(code, now);

        loop {
            let lane = self.lane_at(code, now);
            if let Some(outcome) = self.run_on_lane(&lane, command, now).await? {
                return Ok(outcome);
            }
            debug!(session = code, command_id = %command.id, "session lane replaced; retrying");
        }
    }

    /// Returns `Ok(None)` when `lane` was reset while waiting for it.
    async fn run_on_lane(
        &self,
        lane: &Arc<SessionLane>,
        command: &Command,
        now: OffsetDateTime,
    ) -> Result<Option<CommandOutcome>, ServiceError> {
        let code = lane.code();
        let mut guard = timeout(self.config.command_timeout(), lane.lock())
            .await
            .map_err(|_| {
                warn!(session = code, command_id = %command.id, "timed out waiting for session lane");
                ServiceError::Timeout
            })?;

        let current = self
            .lanes
            .get(code)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), lane));
        if !current {
            return Ok(None);
        }

        if !self.idempotency.try_register_at(code, command.id, now) {
            debug!(
                session = code,
                command_id = %command.id,
                command = %command.name(),
                "duplicate command ignored"
            );
            return Ok(Some(CommandOutcome::Duplicate));
        }

        let execution = match transitions::execute(&guard.snapshot, command, now) {
            Ok(execution) => execution,
            Err(rejection) => {
                self.idempotency.release(code, command.id);
                warn!(
                    session = code,
                    command_id = %command.id,
                    command = %command.name(),
                    reason = rejection.code(),
                    error = %rejection,
                    "command rejected"
                );
                return Err(rejection.into());
            }
        };

        for (event, reason) in &execution.ignored {
            debug!(
                session = code,
                command_id = %command.id,
                event = event.kind(),
                reason = ?reason,
                "event ignored"
            );
        }

        if let Some(next) = execution.next {
            guard.snapshot = next;
            guard.version += 1;
            log_applied(code, &execution.applied);
            let view = GameStateView::new(&guard.snapshot, guard.version);
            sse_events::broadcast_applied(lane.hub(), &execution.applied, &view);
        }

        Ok(Some(CommandOutcome::Accepted(AcceptedCommand {
            applied: execution.applied,
            ignored: execution.ignored,
            snapshot: guard.snapshot.clone(),
            version: guard.version,
        })))
    }

    /// Drop every trace of `code`. Returns whether anything existed.
    pub fn reset_session(&self, code: &str) -> bool {
        let lane = self.lanes.remove(code).map(|(_, lane)| lane);
        let had_connections = self.connections.remove_session(code);
        self.idempotency.remove_session(code);

        if let Some(lane) = &lane {
            sse_events::broadcast_session_closed(lane.hub(), code, CloseReason::Reset);
        }
        let existed = lane.is_some() || had_connections;
        if existed {
            info!(session = code, "session reset");
        }
        existed
    }

    /// Evict idle sessions, returning their codes.
    pub fn sweep_idle_sessions(&self) -> Vec<String> {
        self.sweep_idle_sessions_at(OffsetDateTime::now_utc())
    }

    /// [`Self::sweep_idle_sessions`] with an explicit clock reading.
    ///
    /// A session goes when its connection record is idle, or when it has no
    /// connection record and its lane saw no command for the idle timeout.
    pub fn sweep_idle_sessions_at(&self, now: OffsetDateTime) -> Vec<String> {
        let idle_timeout = self.config.session_idle_timeout();

        let mut evicted = self.connections.sweep_at(now, idle_timeout);
        for code in &evicted {
            self.drop_lane(code, self.lanes.remove(code).map(|(_, lane)| lane));
        }

        let idle_lanes: Vec<String> = self
            .lanes
            .iter()
            .filter(|entry| {
                entry.value().is_idle(now, idle_timeout)
                    && !self.connections.contains_session(entry.key())
            })
            .map(|entry| entry.key().clone())
            .collect();

        for code in idle_lanes {
            // Re-checked under the entry lock: a command may have raced the scan.
            let removed = self
                .lanes
                .remove_if(&code, |_, lane| lane.is_idle(now, idle_timeout))
                .map(|(_, lane)| lane);
            if removed.is_some() {
                self.drop_lane(&code, removed);
                evicted.push(code);
            }
        }

        for code in &evicted {
            info!(session = %code, "idle session evicted");
        }
        evicted
    }

    fn drop_lane(&self, code: &str, lane: Option<Arc<SessionLane>>) {
        self.idempotency.remove_session(code);
        if let Some(lane) = lane {
            sse_events::broadcast_session_closed(lane.hub(), code, CloseReason::Idle);
        }
    }
}

fn log_applied(session: &str, events: &[Event]) {
    for event in events {
        match &event.payload {
            EventPayload::SessionCreated { catalog } => {
                info!(session, songs = catalog.len(), "session created");
            }
            EventPayload::GamePhaseChanged {
                current_phase,
                new_phase,
            } => {
                info!(session, from = %current_phase, to = %new_phase, "phase changed");
            }
            _ => debug!(session, event = event.kind(), "event applied"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::state::{
        envelope::{CommandKind, Role, Song},
        phase::Phase,
        transitions::CommandRejection,
    };

    const T0: OffsetDateTime = datetime!(2026-10-17 20:00 UTC);

    fn state() -> SharedState {
        let config = AppConfig::from_json_str(
            r#"{"session_idle_timeout_secs": 60, "idempotency_ttl_secs": 30}"#,
        )
        .unwrap();
        AppState::new(config)
    }

    fn command(kind: CommandKind) -> Command {
        Command {
            id: Uuid::new_v4(),
            session_code: "QUIZ42".into(),
            issued_by_role: Role::Performer,
            issued_by_id: "host".into(),
            issued_at: T0,
            kind,
        }
    }

    fn create() -> Command {
        command(CommandKind::CreateSession {
            catalog: vec![Song {
                id: "s1".into(),
                title: "Intro".into(),
                artist: None,
                choices: vec!["a".into(), "b".into()],
                hints: vec![],
                media_url: None,
            }],
        })
    }

    fn accepted(outcome: CommandOutcome) -> AcceptedCommand {
        match outcome {
            CommandOutcome::Accepted(accepted) => accepted,
            CommandOutcome::Duplicate => panic!("expected an accepted command"),
        }
    }

    #[tokio::test]
    async fn duplicate_commands_apply_once() {
        let state = state();
        let create = create();

        let first = accepted(state.run_command_at(&create, T0).await.unwrap());
        assert_eq!(first.version, 1);
        assert_eq!(first.snapshot.phase, Phase::Lobby);

        let again = state.run_command_at(&create, T0).await.unwrap();
        assert!(matches!(again, CommandOutcome::Duplicate));
        assert_eq!(state.snapshot("QUIZ42").await.unwrap().1, 1);
    }

    #[tokio::test]
    async fn rejected_command_releases_its_id() {
        let state = state();
        let lock = command(CommandKind::LockAnswers);

        let err = state.run_command_at(&lock, T0).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CommandRejection::Phase(_))
        ));
        assert!(state.idempotency().is_empty("QUIZ42"));

        let (snapshot, version) = state.snapshot("QUIZ42").await.unwrap();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn applied_commands_are_broadcast_with_snapshot() {
        let state = state();
        let (mut receiver, view) = state.subscribe("QUIZ42").await.unwrap();
        assert_eq!(view.version, 0);

        state.run_command_at(&create(), T0).await.unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("SessionCreated"));
        let snapshot = receiver.recv().await.unwrap();
        assert_eq!(snapshot.event.as_deref(), Some("snapshot"));
    }

    #[tokio::test]
    async fn ignored_only_commands_do_not_bump_version() {
        let state = state();
        state.run_command_at(&create(), T0).await.unwrap();
        state
            .run_command_at(&command(CommandKind::StartGame), T0)
            .await
            .unwrap();

        let hint = accepted(
            state
                .run_command_at(&command(CommandKind::GiveHint), T0)
                .await
                .unwrap(),
        );
        // The phase moves to Hint, the hint itself is ignored: no hints exist.
        assert_eq!(hint.applied.len(), 1);
        assert_eq!(hint.ignored.len(), 1);
        assert_eq!(hint.version, 3);

        let again = accepted(
            state
                .run_command_at(&command(CommandKind::GiveHint), T0)
                .await
                .unwrap(),
        );
        assert!(again.applied.is_empty());
        assert_eq!(again.version, 3);
    }

    #[tokio::test]
    async fn reset_drops_everything_and_notifies() {
        let state = state();
        state.run_command_at(&create(), T0).await.unwrap();
        let (mut receiver, _) = state.subscribe("QUIZ42").await.unwrap();
        state
            .connections()
            .touch_at("QUIZ42", Role::Projector, "c1", None, T0);

        assert!(state.reset_session("QUIZ42"));

        assert!(!state.has_session("QUIZ42"));
        assert!(state.connections().counts("QUIZ42").is_none());
        assert!(state.idempotency().is_empty("QUIZ42"));
        assert!(receiver.recv().await.unwrap().closes_session());
        assert!(!state.reset_session("QUIZ42"));
    }

    #[tokio::test]
    async fn sweep_evicts_idle_lanes_and_connection_records() {
        let state = state();
        state.run_command_at(&create(), T0).await.unwrap();

        let mut other = create();
        other.session_code = "WATCHED".into();
        state.run_command_at(&other, T0).await.unwrap();
        state
            .connections()
            .touch_at("WATCHED", Role::Audience, "c1", None, T0);

        let mut busy = create();
        busy.session_code = "BUSY".into();
        state
            .run_command_at(&busy, T0 + time::Duration::seconds(30))
            .await
            .unwrap();

        let mut evicted = state.sweep_idle_sessions_at(T0 + time::Duration::seconds(61));
        evicted.sort();

        assert_eq!(evicted, vec!["QUIZ42".to_string(), "WATCHED".to_string()]);
        assert!(state.has_session("BUSY"));
        assert!(!state.has_session("QUIZ42"));
        assert!(state.connections().counts("WATCHED").is_none());
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn lane_timeout_reports_without_registering() {
        let config = AppConfig::from_json_str(r#"{"command_timeout_secs": 1}"#).unwrap();
        let state = AppState::new(config);
        let lane = state.lane("QUIZ42");
        let _held = lane.lock().await;

        let create = create();
        let pending = state.run_command(&create);
        let err = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, ServiceError::Timeout));
        assert!(state.idempotency().is_empty("QUIZ42"));
    }
}
