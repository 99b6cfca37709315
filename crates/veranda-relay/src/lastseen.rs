//! Last-seen tracking with batched broadcast.
//!
//! Every qualifying message updates two durable records: "who spoke last
//! on this subject" and, for friends, "where was this person last
//! active". Persistence happens on every mutation; broadcast does not —
//! changes are staged and flushed as one batch per interval, so a busy
//! channel costs one push per tick instead of one per message.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use veranda_shared::types::Relationship;
use veranda_store::LastSeenStore;

/// One staged last-seen change. For a subject update `name` is the
/// subject and `counterpart` the username; for a person update the
/// other way around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastSeenUpdate {
    pub name: String,
    pub counterpart: String,
    pub at: DateTime<Utc>,
}

/// One batched broadcast of pending last-seen changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastSeenBatch {
    pub subjects: Vec<LastSeenUpdate>,
    pub people: Vec<LastSeenUpdate>,
}

/// Tracks last-seen records and stages them for batched broadcast.
pub struct LastSeenTracker {
    store: LastSeenStore,
    pending_subjects: HashMap<String, LastSeenUpdate>,
    pending_people: HashMap<String, LastSeenUpdate>,
}

impl LastSeenTracker {
    pub fn new(store: LastSeenStore) -> Self {
        Self {
            store,
            pending_subjects: HashMap::new(),
            pending_people: HashMap::new(),
        }
    }

    /// Record qualifying activity by `username` on `subject`. The
    /// in-memory record is authoritative; a persistence failure is
    /// reported and the update proceeds regardless.
    pub fn record(
        &mut self,
        subject: &str,
        username: &str,
        at: DateTime<Utc>,
        tier: Relationship,
    ) {
        if let Err(e) = self.store.record_subject(subject, username, at) {
            warn!(subject, error = %e, "Failed to persist subject last-seen");
        }
        self.pending_subjects.insert(
            subject.to_string(),
            LastSeenUpdate {
                name: subject.to_string(),
                counterpart: username.to_string(),
                at,
            },
        );

        if tier >= Relationship::Friend {
            if let Err(e) = self.store.record_person(username, subject, at) {
                warn!(username, error = %e, "Failed to persist person last-seen");
            }
            self.pending_people.insert(
                username.to_string(),
                LastSeenUpdate {
                    name: username.to_string(),
                    counterpart: subject.to_string(),
                    at,
                },
            );
        }
    }

    /// Drain the pending buffer into one batch, or `None` when nothing
    /// changed since the last flush. Entries are sorted by name so a
    /// batch is deterministic.
    pub fn take_batch(&mut self) -> Option<LastSeenBatch> {
        if self.pending_subjects.is_empty() && self.pending_people.is_empty() {
            return None;
        }

        let mut subjects: Vec<LastSeenUpdate> = self.pending_subjects.drain().map(|(_, u)| u).collect();
        let mut people: Vec<LastSeenUpdate> = self.pending_people.drain().map(|(_, u)| u).collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        people.sort_by(|a, b| a.name.cmp(&b.name));

        Some(LastSeenBatch { subjects, people })
    }

    pub fn store(&self) -> &LastSeenStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (LastSeenTracker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LastSeenStore::load(dir.path()).unwrap();
        (LastSeenTracker::new(store), dir)
    }

    #[test]
    fn test_record_updates_both_stores_for_friends() {
        let (mut tracker, _dir) = tracker();
        let at = Utc::now();

        tracker.record("#general", "alice", at, Relationship::Friend);

        assert_eq!(tracker.store().subject("#general").unwrap().counterpart, "alice");
        assert_eq!(tracker.store().person("alice").unwrap().counterpart, "#general");
    }

    #[test]
    fn test_no_person_record_below_friend_tier() {
        let (mut tracker, _dir) = tracker();

        tracker.record("#general", "stranger", Utc::now(), Relationship::None);

        assert!(tracker.store().subject("#general").is_some());
        assert!(tracker.store().person("stranger").is_none());
    }

    #[test]
    fn test_batching_coalesces_per_key() {
        let (mut tracker, _dir) = tracker();
        let at = Utc::now();

        // Five distinct subjects within one interval: one batch of five.
        for i in 0..5 {
            tracker.record(&format!("#chan{i}"), "alice", at, Relationship::None);
        }
        // Repeat activity on an already-pending subject stays one entry.
        tracker.record("#chan0", "bob", at, Relationship::None);

        let batch = tracker.take_batch().unwrap();
        assert_eq!(batch.subjects.len(), 5);
        assert_eq!(batch.subjects[0].counterpart, "bob");
        assert!(batch.people.is_empty());

        // Nothing pending after a flush.
        assert!(tracker.take_batch().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_persistence_failure_still_stages_update() {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        let (mut tracker, dir) = tracker();

        // Make the store directory unwritable so the wholesale rewrite
        // fails. The in-memory record is authoritative, so the update
        // must still be staged and broadcast.
        std::fs::set_permissions(dir.path(), Permissions::from_mode(0o555)).unwrap();
        tracker.record("#general", "alice", Utc::now(), Relationship::Friend);
        std::fs::set_permissions(dir.path(), Permissions::from_mode(0o755)).unwrap();

        assert_eq!(tracker.store().subject("#general").unwrap().counterpart, "alice");
        let batch = tracker.take_batch().unwrap();
        assert_eq!(batch.subjects[0].name, "#general");
        assert_eq!(batch.people[0].name, "alice");
    }

    #[test]
    fn test_batch_is_sorted() {
        let (mut tracker, _dir) = tracker();
        let at = Utc::now();

        tracker.record("#zebra", "a", at, Relationship::None);
        tracker.record("#alpha", "b", at, Relationship::None);

        let batch = tracker.take_batch().unwrap();
        assert_eq!(batch.subjects[0].name, "#alpha");
        assert_eq!(batch.subjects[1].name, "#zebra");
    }
}
