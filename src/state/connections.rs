//! Live connection bookkeeping per session and role.
//!
//! Answers "is anyone still watching this session", independently of the game
//! state. A connection id is registered under exactly one session and role.

use std::{collections::HashMap, time::Duration};

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::state::envelope::Role;

/// Roles whose absence leaves a show unable to run.
pub const CRITICAL_ROLES: [Role; 3] = [Role::Performer, Role::Projector, Role::Engine];

/// Number of live connections per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCounts {
    /// Connected performers.
    pub performer: usize,
    /// Connected projectors.
    pub projector: usize,
    /// Connected playback engines.
    pub engine: usize,
    /// Connected audience members.
    pub audience: usize,
}

impl RoleCounts {
    /// Count for a single role.
    pub fn get(&self, role: Role) -> usize {
        match role {
            Role::Performer => self.performer,
            Role::Projector => self.projector,
            Role::Engine => self.engine,
            Role::Audience => self.audience,
        }
    }

    /// Sum over every role.
    pub fn total(&self) -> usize {
        self.performer + self.projector + self.engine + self.audience
    }

    /// Critical roles without any live connection.
    pub fn missing_critical_roles(&self) -> Vec<Role> {
        CRITICAL_ROLES
            .into_iter()
            .filter(|role| self.get(*role) == 0)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionKey {
    session: String,
    role: Role,
}

#[derive(Debug)]
struct SessionConnections {
    /// Connection id → display name, per role.
    roles: HashMap<Role, HashMap<String, Option<String>>>,
    last_activity: OffsetDateTime,
}

impl SessionConnections {
    fn new(now: OffsetDateTime) -> Self {
        Self {
            roles: HashMap::new(),
            last_activity: now,
        }
    }

    fn is_empty(&self) -> bool {
        self.roles.values().all(HashMap::is_empty)
    }

    fn counts(&self) -> RoleCounts {
        let count = |role| self.roles.get(&role).map(HashMap::len).unwrap_or(0);
        RoleCounts {
            performer: count(Role::Performer),
            projector: count(Role::Projector),
            engine: count(Role::Engine),
            audience: count(Role::Audience),
        }
    }

    fn is_idle(&self, now: OffsetDateTime, idle_timeout: Duration) -> bool {
        now - self.last_activity > idle_timeout
    }
}

/// Registry of live connections, indexed both by session and by connection id.
#[derive(Default)]
pub struct ConnectionStore {
    sessions: DashMap<String, SessionConnections>,
    index: DashMap<String, ConnectionKey>,
}

impl ConnectionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh `connection_id` under `role` and bump the session's activity.
    pub fn touch(
        &self,
        session: &str,
        role: Role,
        connection_id: &str,
        display_name: Option<String>,
    ) {
        self.touch_at(
            session,
            role,
            connection_id,
            display_name,
            OffsetDateTime::now_utc(),
        );
    }

    /// [`Self::touch`] with an explicit clock reading.
    pub fn touch_at(
        &self,
        session: &str,
        role: Role,
        connection_id: &str,
        display_name: Option<String>,
        now: OffsetDateTime,
    ) {
        let key = ConnectionKey {
            session: session.to_string(),
            role,
        };
        if let Some(previous) = self.index.insert(connection_id.to_string(), key.clone()) {
            if previous != key {
                self.detach(&previous, connection_id);
            }
        }

        let mut entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionConnections::new(now));
        let bucket = entry.roles.entry(role).or_default();
        match display_name {
            Some(name) => {
                bucket.insert(connection_id.to_string(), Some(name));
            }
            None => {
                bucket.entry(connection_id.to_string()).or_insert(None);
            }
        }
        entry.last_activity = entry.last_activity.max(now);
    }

    /// Bump the activity of the session `connection_id` belongs to.
    pub fn refresh(&self, connection_id: &str) -> bool {
        self.refresh_at(connection_id, OffsetDateTime::now_utc())
    }

    /// [`Self::refresh`] with an explicit clock reading.
    pub fn refresh_at(&self, connection_id: &str, now: OffsetDateTime) -> bool {
        let Some(key) = self.index.get(connection_id).map(|entry| entry.value().clone()) else {
            return false;
        };
        match self.sessions.get_mut(&key.session) {
            Some(mut entry) => {
                entry.last_activity = entry.last_activity.max(now);
                true
            }
            None => false,
        }
    }

    /// Bump the activity of `session` without touching any connection.
    pub fn mark_session_active_at(&self, session: &str, now: OffsetDateTime) -> bool {
        match self.sessions.get_mut(session) {
            Some(mut entry) => {
                entry.last_activity = entry.last_activity.max(now);
                true
            }
            None => false,
        }
    }

    /// Remove `connection_id` from wherever it is registered, returning its
    /// session and role. A session left without connections is dropped.
    pub fn remove(&self, connection_id: &str) -> Option<(String, Role)> {
        let (_, key) = self.index.remove(connection_id)?;
        self.detach(&key, connection_id);
        Some((key.session, key.role))
    }

    /// Per-role counts of `session`, if it has a connection record.
    pub fn counts(&self, session: &str) -> Option<RoleCounts> {
        self.sessions.get(session).map(|entry| entry.counts())
    }

    /// Display name registered for `connection_id`.
    pub fn display_name(&self, connection_id: &str) -> Option<String> {
        let key = self.index.get(connection_id)?.value().clone();
        let entry = self.sessions.get(&key.session)?;
        entry.roles.get(&key.role)?.get(connection_id)?.clone()
    }

    /// Session codes with a connection record.
    pub fn session_codes(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Whether `session` has a connection record.
    pub fn contains_session(&self, session: &str) -> bool {
        self.sessions.contains_key(session)
    }

    /// Drop `session` and every connection registered under it.
    pub fn remove_session(&self, session: &str) -> bool {
        let Some((_, connections)) = self.sessions.remove(session) else {
            return false;
        };
        self.unindex(session, &connections);
        true
    }

    /// Evict sessions idle for longer than `idle_timeout`, returning their codes.
    pub fn sweep(&self, idle_timeout: Duration) -> Vec<String> {
        self.sweep_at(OffsetDateTime::now_utc(), idle_timeout)
    }

    /// [`Self::sweep`] with an explicit clock reading.
    pub fn sweep_at(&self, now: OffsetDateTime, idle_timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_idle(now, idle_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|session| {
                // Re-checked under the entry lock: a touch may have raced the scan.
                match self
                    .sessions
                    .remove_if(session, |_, entry| entry.is_idle(now, idle_timeout))
                {
                    Some((_, connections)) => {
                        self.unindex(session, &connections);
                        true
                    }
                    None => false,
                }
            })
            .collect()
    }

    fn detach(&self, key: &ConnectionKey, connection_id: &str) {
        let emptied = match self.sessions.get_mut(&key.session) {
            Some(mut entry) => {
                if let Some(bucket) = entry.roles.get_mut(&key.role) {
                    bucket.remove(connection_id);
                    if bucket.is_empty() {
                        entry.roles.remove(&key.role);
                    }
                }
                entry.is_empty()
            }
            None => false,
        };

        if emptied {
            self.sessions
                .remove_if(&key.session, |_, entry| entry.is_empty());
        }
    }

    fn unindex(&self, session: &str, connections: &SessionConnections) {
        for connection_id in connections.roles.values().flat_map(HashMap::keys) {
            self.index
                .remove_if(connection_id, |_, key| key.session == session);
        }
    }
}
