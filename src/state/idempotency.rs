//! Per-session command deduplication within a TTL window.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Remembers recently seen command ids, per session.
///
/// Each session owns a bounded FIFO guarded by its own mutex, so registrations
/// for different sessions never contend.
pub struct IdempotencyStore {
    ttl: Duration,
    max_entries: usize,
    records: DashMap<String, Arc<Mutex<IdempotencyRecord>>>,
}

#[derive(Debug, Default)]
struct IdempotencyRecord {
    /// Arrival order; seen timestamps are non-decreasing.
    entries: VecDeque<(Uuid, OffsetDateTime)>,
    seen: HashSet<Uuid>,
}

impl IdempotencyRecord {
    fn prune(&mut self, now: OffsetDateTime, ttl: Duration) {
        while let Some((id, seen_at)) = self.entries.front().copied() {
            if now - seen_at <= ttl {
                break;
            }
            self.entries.pop_front();
            self.seen.remove(&id);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((id, _)) = self.entries.pop_front() {
            self.seen.remove(&id);
        }
    }

    fn forget(&mut self, command_id: Uuid) -> bool {
        if !self.seen.remove(&command_id) {
            return false;
        }
        self.entries.retain(|(id, _)| *id != command_id);
        true
    }
}

impl IdempotencyStore {
    /// Create a store expiring entries after `ttl` and keeping at most
    /// `max_entries` ids per session.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            records: DashMap::new(),
        }
    }

    /// Register `command_id` for `session` at the current time.
    ///
    /// Returns `true` the first time an id is seen within the TTL window and
    /// `false` for repeats.
    pub fn try_register(&self, session: &str, command_id: Uuid) -> bool {
        self.try_register_at(session, command_id, OffsetDateTime::now_utc())
    }

    /// [`Self::try_register`] with an explicit clock reading.
    pub fn try_register_at(&self, session: &str, command_id: Uuid, now: OffsetDateTime) -> bool {
        let record = self.record(session);
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);

        record.prune(now, self.ttl);
        if record.seen.contains(&command_id) {
            return false;
        }

        // Full: the oldest id goes even if it has not expired yet.
        while record.entries.len() >= self.max_entries {
            record.evict_oldest();
        }

        record.entries.push_back((command_id, now));
        record.seen.insert(command_id);
        true
    }

    /// Forget a registration so the same id is treated as new again.
    pub fn release(&self, session: &str, command_id: Uuid) -> bool {
        let Some(record) = self.records.get(session).map(|entry| entry.value().clone()) else {
            return false;
        };
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        record.forget(command_id)
    }

    /// Drop every registration of `session`.
    pub fn remove_session(&self, session: &str) {
        self.records.remove(session);
    }

    /// Number of ids currently remembered for `session`, expired ones included.
    pub fn len(&self, session: &str) -> usize {
        self.records
            .get(session)
            .map(|entry| entry.value().clone())
            .map(|record| {
                record
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .len()
            })
            .unwrap_or(0)
    }

    /// Whether nothing is remembered for `session`.
    pub fn is_empty(&self, session: &str) -> bool {
        self.len(session) == 0
    }

    fn record(&self, session: &str) -> Arc<Mutex<IdempotencyRecord>> {
        if let Some(existing) = self.records.get(session) {
            return existing.value().clone();
        }
        self.records
            .entry(session.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use time::macros::datetime;

    use super::*;

    const T0: OffsetDateTime = datetime!(2026-10-17 20:00 UTC);

    fn store() -> IdempotencyStore {
        IdempotencyStore::new(Duration::from_secs(60), 4)
    }

    #[test]
    fn repeat_within_ttl_is_a_duplicate() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(store.try_register_at("QUIZ42", id, T0));
        assert!(!store.try_register_at("QUIZ42", id, T0 + time::Duration::seconds(59)));
    }

    #[test]
    fn repeat_after_ttl_is_new_again() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(store.try_register_at("QUIZ42", id, T0));
        assert!(store.try_register_at("QUIZ42", id, T0 + time::Duration::seconds(61)));
        assert_eq!(store.len("QUIZ42"), 1);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(store.try_register_at("QUIZ42", id, T0));
        assert!(store.try_register_at("OTHER", id, T0));
    }

    #[test]
    fn full_record_evicts_oldest_unexpired_entry() {
        let store = store();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (offset, id) in ids.iter().enumerate() {
            let now = T0 + time::Duration::seconds(offset as i64);
            assert!(store.try_register_at("QUIZ42", *id, now));
        }
        assert_eq!(store.len("QUIZ42"), 4);

        let now = T0 + time::Duration::seconds(10);
        // The first id was pushed out to admit the fifth one.
        assert!(store.try_register_at("QUIZ42", ids[0], now));
        assert!(!store.try_register_at("QUIZ42", ids[4], now));
        assert_eq!(store.len("QUIZ42"), 4);
    }

    #[test]
    fn expired_entries_are_pruned_lazily() {
        let store = store();
        store.try_register_at("QUIZ42", Uuid::new_v4(), T0);
        store.try_register_at("QUIZ42", Uuid::new_v4(), T0 + time::Duration::seconds(30));
        assert_eq!(store.len("QUIZ42"), 2);

        store.try_register_at("QUIZ42", Uuid::new_v4(), T0 + time::Duration::seconds(75));
        assert_eq!(store.len("QUIZ42"), 2);
    }

    #[test]
    fn released_ids_can_be_registered_again() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(store.try_register_at("QUIZ42", id, T0));
        assert!(store.release("QUIZ42", id));
        assert!(store.try_register_at("QUIZ42", id, T0));
        assert!(!store.release("QUIZ42", Uuid::new_v4()));
        assert!(!store.release("UNKNOWN", id));
    }

    #[test]
    fn remove_session_forgets_everything() {
        let store = store();
        let id = Uuid::new_v4();
        store.try_register_at("QUIZ42", id, T0);
        store.remove_session("QUIZ42");
        assert!(store.is_empty("QUIZ42"));
        assert!(store.try_register_at("QUIZ42", id, T0));
    }

    #[test]
    fn concurrent_registration_accepts_exactly_once() {
        let store = Arc::new(IdempotencyStore::new(Duration::from_secs(60), 128));
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.try_register("QUIZ42", id))
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
