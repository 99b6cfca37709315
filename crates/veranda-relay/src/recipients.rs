//! Recipient tracking and fan-out.
//!
//! A recipient is an opaque id plus a delivery channel; no viewer
//! connection type ever reaches the core. Delivery happens in
//! registration order, and a recipient whose channel has closed is
//! skipped silently and pruned — one dead viewer never aborts delivery
//! to the rest.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use veranda_shared::event::CanonicalEvent;
use veranda_shared::types::{EventId, SubjectId};

use crate::lastseen::LastSeenBatch;

/// Opaque identity of one live viewer connection.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct RecipientId(pub Uuid);

impl RecipientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecipientId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the engine pushes to viewers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "push", rename_all = "snake_case")]
pub enum Push {
    /// A fresh event on a subscribed subject.
    Event {
        subject: SubjectId,
        event: CanonicalEvent,
    },
    /// A bunch replaced the events behind `retired`; drop them and
    /// render the bunch instead.
    Replace {
        subject: SubjectId,
        retired: Vec<EventId>,
        event: CanonicalEvent,
    },
    /// One-time history replay delivered on subscribe.
    History {
        subject: SubjectId,
        events: Vec<CanonicalEvent>,
    },
    /// Batched last-seen changes.
    LastSeen(LastSeenBatch),
    /// Full user-list snapshot for a channel.
    UserList {
        subject: SubjectId,
        users: Vec<String>,
    },
}

/// A recipient's delivery capability: id plus sender half of its push
/// channel. Cloneable so the same viewer can subscribe to many subjects.
#[derive(Debug, Clone)]
pub struct RecipientHandle {
    pub id: RecipientId,
    tx: mpsc::UnboundedSender<Push>,
}

impl RecipientHandle {
    pub fn new(id: RecipientId, tx: mpsc::UnboundedSender<Push>) -> Self {
        Self { id, tx }
    }

    /// Deliver one push. Returns `false` when the recipient has gone
    /// stale (its channel closed).
    pub fn deliver(&self, push: Push) -> bool {
        self.tx.send(push).is_ok()
    }
}

/// Tracks which recipients are interested in which subjects.
pub struct RecipientRegistry {
    /// Per-subject recipients in registration order.
    subscriptions: HashMap<SubjectId, Vec<RecipientHandle>>,
    /// Recipients interested in system-wide last-seen batches.
    last_seen_watchers: Vec<RecipientHandle>,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            last_seen_watchers: Vec::new(),
        }
    }

    /// Subscribe a recipient to a subject. Idempotent per
    /// (subject, recipient id); returns `true` only when the recipient
    /// was newly added.
    pub fn subscribe(&mut self, subject: SubjectId, recipient: RecipientHandle) -> bool {
        let entry = self.subscriptions.entry(subject).or_default();
        if entry.iter().any(|r| r.id == recipient.id) {
            return false;
        }
        entry.push(recipient);
        true
    }

    pub fn unsubscribe(&mut self, subject: &SubjectId, recipient: RecipientId) {
        if let Some(entry) = self.subscriptions.get_mut(subject) {
            entry.retain(|r| r.id != recipient);
            if entry.is_empty() {
                self.subscriptions.remove(subject);
            }
        }
    }

    /// Remove a disconnected recipient from every subject and the
    /// last-seen watcher list.
    pub fn drop_recipient(&mut self, recipient: RecipientId) {
        self.subscriptions.retain(|_, entry| {
            entry.retain(|r| r.id != recipient);
            !entry.is_empty()
        });
        self.last_seen_watchers.retain(|r| r.id != recipient);
    }

    /// Deliver a push to every recipient of a subject, in registration
    /// order. Stale recipients are pruned, not errors.
    pub fn publish(&mut self, subject: &SubjectId, push: Push) {
        let Some(entry) = self.subscriptions.get_mut(subject) else {
            return;
        };
        entry.retain(|recipient| {
            let alive = recipient.deliver(push.clone());
            if !alive {
                debug!(recipient = %recipient.id.0, "Pruning stale recipient");
            }
            alive
        });
        if entry.is_empty() {
            self.subscriptions.remove(subject);
        }
    }

    /// Register interest in batched last-seen updates. Idempotent.
    pub fn watch_last_seen(&mut self, recipient: RecipientHandle) {
        if !self.last_seen_watchers.iter().any(|r| r.id == recipient.id) {
            self.last_seen_watchers.push(recipient);
        }
    }

    pub fn unwatch_last_seen(&mut self, recipient: RecipientId) {
        self.last_seen_watchers.retain(|r| r.id != recipient);
    }

    /// Broadcast one last-seen batch to every watcher.
    pub fn broadcast_last_seen(&mut self, batch: LastSeenBatch) {
        self.last_seen_watchers
            .retain(|recipient| recipient.deliver(Push::LastSeen(batch.clone())));
    }

    /// Number of recipients currently subscribed to a subject.
    pub fn recipient_count(&self, subject: &SubjectId) -> usize {
        self.subscriptions.get(subject).map_or(0, Vec::len)
    }
}

impl Default for RecipientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use veranda_shared::event::EventBody;
    use veranda_shared::types::Relationship;

    fn subject() -> SubjectId {
        SubjectId::channel("efnet", "#test")
    }

    fn recipient() -> (RecipientHandle, mpsc::UnboundedReceiver<Push>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RecipientHandle::new(RecipientId::new(), tx), rx)
    }

    fn event_push() -> Push {
        Push::Event {
            subject: subject(),
            event: CanonicalEvent {
                id: EventId::new(),
                at: Utc::now(),
                subject: subject(),
                relationship: Relationship::None,
                body: EventBody::Join { who: "alice".into() },
            },
        }
    }

    #[test]
    fn test_fan_out_completeness() {
        let mut registry = RecipientRegistry::new();
        let (a, mut a_rx) = recipient();
        let (b, mut b_rx) = recipient();
        let (c, mut c_rx) = recipient();

        registry.subscribe(subject(), a);
        registry.subscribe(subject(), b);
        // c never subscribes.

        registry.publish(&subject(), event_push());

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_err());
        assert!(a_rx.try_recv().is_err(), "exactly one delivery each");
        drop(c);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut registry = RecipientRegistry::new();
        let (a, mut rx) = recipient();

        assert!(registry.subscribe(subject(), a.clone()));
        assert!(!registry.subscribe(subject(), a));
        assert_eq!(registry.recipient_count(&subject()), 1);

        registry.publish(&subject(), event_push());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "no duplicate delivery");
    }

    #[test]
    fn test_stale_recipient_skipped_silently() {
        let mut registry = RecipientRegistry::new();
        let (stale, stale_rx) = recipient();
        let (live, mut live_rx) = recipient();

        registry.subscribe(subject(), stale);
        registry.subscribe(subject(), live);
        drop(stale_rx);

        registry.publish(&subject(), event_push());

        assert!(live_rx.try_recv().is_ok());
        assert_eq!(registry.recipient_count(&subject()), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut registry = RecipientRegistry::new();
        let (a, mut rx) = recipient();
        let id = a.id;

        registry.subscribe(subject(), a);
        registry.unsubscribe(&subject(), id);
        registry.publish(&subject(), event_push());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_recipient_removes_everywhere() {
        let mut registry = RecipientRegistry::new();
        let other = SubjectId::channel("libera", "#other");
        let (a, mut rx) = recipient();
        let id = a.id;

        registry.subscribe(subject(), a.clone());
        registry.subscribe(other.clone(), a.clone());
        registry.watch_last_seen(a);

        registry.drop_recipient(id);

        registry.publish(&subject(), event_push());
        registry.publish(&other, event_push());
        registry.broadcast_last_seen(LastSeenBatch {
            subjects: vec![],
            people: vec![],
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_seen_watchers() {
        let mut registry = RecipientRegistry::new();
        let (a, mut rx) = recipient();

        registry.watch_last_seen(a.clone());
        registry.watch_last_seen(a); // idempotent

        registry.broadcast_last_seen(LastSeenBatch {
            subjects: vec![],
            people: vec![],
        });
        assert!(matches!(rx.try_recv(), Ok(Push::LastSeen(_))));
        assert!(rx.try_recv().is_err());
    }
}
