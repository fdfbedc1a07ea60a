//! Per-session serialization unit.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::state::{game::GameStateSnapshot, hub::SessionHub};

/// State guarded by the lane lock.
#[derive(Debug)]
pub struct LaneState {
    /// Latest stored snapshot.
    pub snapshot: GameStateSnapshot,
    /// Bumped once per command that applied at least one event.
    pub version: u64,
}

/// Owns one session's snapshot and hub.
///
/// Every command for the session runs while holding [`SessionLane::lock`],
/// so commands are applied one at a time in lock acquisition order. Tokio's
/// mutex is fair, so waiters are served first come first served.
pub struct SessionLane {
    code: String,
    state: Mutex<LaneState>,
    hub: SessionHub,
    /// Unix timestamp in milliseconds.
    last_activity_ms: AtomicI64,
}

impl SessionLane {
    /// Fresh lane holding an `Idle` snapshot.
    pub fn new(code: impl Into<String>, broadcast_capacity: usize, now: OffsetDateTime) -> Self {
        let code = code.into();
        Self {
            state: Mutex::new(LaneState {
                snapshot: GameStateSnapshot::new(code.clone()),
                version: 0,
            }),
            code,
            hub: SessionHub::new(broadcast_capacity),
            last_activity_ms: AtomicI64::new(unix_millis(now)),
        }
    }

    /// Session code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Wait for exclusive access to the snapshot.
    pub async fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().await
    }

    /// Copy of the stored snapshot and its version.
    pub async fn read(&self) -> (GameStateSnapshot, u64) {
        let guard = self.state.lock().await;
        (guard.snapshot.clone(), guard.version)
    }

    /// Broadcast hub of this session.
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Record activity at `now`. Never moves the stamp backwards.
    pub fn mark_active(&self, now: OffsetDateTime) {
        self.last_activity_ms
            .fetch_max(unix_millis(now), Ordering::Relaxed);
    }

    /// Whether nothing happened on this lane for longer than `idle_timeout`.
    pub fn is_idle(&self, now: OffsetDateTime, idle_timeout: Duration) -> bool {
        let idle_ms = i64::try_from(idle_timeout.as_millis()).unwrap_or(i64::MAX);
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        unix_millis(now).saturating_sub(last) > idle_ms
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
