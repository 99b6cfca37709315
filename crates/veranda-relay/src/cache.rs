//! Per-subject bounded history with event coalescing.
//!
//! Chat networks emit bursts of join/part/mode churn, especially after a
//! reconnect storm. Consecutive presence/state events on a subject are
//! coalesced ("bunched") into a single tail entry that keeps every
//! original event, so both the cache and the fan-out volume stay compact
//! without losing data. Messages, actions, and kicks never bunch and
//! always terminate a run.
//!
//! The engine task is the only mutator, so the tail replacement below
//! needs no synchronization: an append runs to completion before the
//! next callback is processed.

use std::collections::{HashMap, VecDeque};

use veranda_shared::event::{CanonicalEvent, EventBody};
use veranda_shared::types::{EventId, Relationship, SubjectId};

/// What an append did to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The event went in as a fresh tail entry.
    Appended(CanonicalEvent),
    /// The tail entry was replaced by a bunch absorbing the new event.
    /// Consumers still holding `retired` ids must drop them in favour of
    /// the bunch, not render both.
    Bunched {
        event: CanonicalEvent,
        retired: Vec<EventId>,
    },
}

impl AppendOutcome {
    pub fn event(&self) -> &CanonicalEvent {
        match self {
            AppendOutcome::Appended(event) => event,
            AppendOutcome::Bunched { event, .. } => event,
        }
    }
}

/// Bounded per-subject history buffers.
pub struct SubjectCache {
    capacity: usize,
    buffers: HashMap<SubjectId, VecDeque<CanonicalEvent>>,
}

impl SubjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            // A zero capacity would evict every event the moment it is
            // appended; the smallest usable buffer holds one entry.
            capacity: capacity.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Append a normalized event to its subject's buffer, bunching it
    /// into the tail entry when both are bunchable, then evict back down
    /// to capacity.
    pub fn append(&mut self, event: CanonicalEvent) -> AppendOutcome {
        let buffer = self.buffers.entry(event.subject.clone()).or_default();

        let tail_bunches = buffer
            .back()
            .map_or(false, |tail| tail.is_bunch() || tail.is_bunchable());

        if event.is_bunchable() && tail_bunches {
            if let Some(old) = buffer.pop_back() {
                let retired = vec![old.id];
                let bunch = absorb(old, event);
                buffer.push_back(bunch.clone());
                return AppendOutcome::Bunched {
                    event: bunch,
                    retired,
                };
            }
        }

        buffer.push_back(event.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }

        AppendOutcome::Appended(event)
    }

    /// Snapshot of a subject's history, oldest first.
    pub fn history(&self, subject: &SubjectId) -> Vec<CanonicalEvent> {
        self.buffers
            .get(subject)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of cached entries for a subject.
    pub fn len(&self, subject: &SubjectId) -> usize {
        self.buffers.get(subject).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, subject: &SubjectId) -> bool {
        self.len(subject) == 0
    }
}

/// Fold `incoming` into `old` (the current tail), producing a fresh
/// bunch whose `replaced` list carries the full id lineage.
fn absorb(old: CanonicalEvent, incoming: CanonicalEvent) -> CanonicalEvent {
    let subject = incoming.subject.clone();
    let at = incoming.at;

    let (events, replaced) = match old.body {
        EventBody::Bunch {
            events: mut absorbed,
            replaced: mut lineage,
        } => {
            let old_id = old.id;
            absorbed.push(incoming);
            lineage.push(old_id);
            (absorbed, lineage)
        }
        _ => {
            let old_id = old.id;
            (vec![old, incoming], vec![old_id])
        }
    };

    CanonicalEvent {
        id: EventId::new(),
        at,
        subject,
        relationship: Relationship::None,
        body: EventBody::Bunch { events, replaced },
    }
}
