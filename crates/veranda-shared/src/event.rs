//! The canonical event model.
//!
//! Every heterogeneous protocol callback is normalized into a
//! [`CanonicalEvent`] before it touches the cache, the recipients, or the
//! last-seen tracker. The payload is a tagged union over the fixed kind
//! set so every consumer match is checked for exhaustiveness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, Relationship, SubjectId};

/// One normalized thing that happened on a subject. Immutable once
/// created; a bunch replaces its predecessors rather than mutating them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEvent {
    pub id: EventId,
    pub at: DateTime<Utc>,
    pub subject: SubjectId,
    /// Tier of the acting user, `None` when nobody in particular acted
    /// or the actor is not a configured person.
    pub relationship: Relationship,
    pub body: EventBody,
}

/// Kind-specific payload of a [`CanonicalEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    Message {
        from: String,
        text: String,
        /// Operator nick/alias substrings that matched, empty when none did.
        highlights: Vec<String>,
    },
    Action {
        from: String,
        text: String,
        highlights: Vec<String>,
    },
    Join {
        who: String,
    },
    Part {
        who: String,
        reason: Option<String>,
    },
    Quit {
        who: String,
        reason: Option<String>,
    },
    Kick {
        who: String,
        by: String,
        reason: Option<String>,
    },
    Kill {
        who: String,
        by: String,
        reason: Option<String>,
    },
    Mode {
        by: Option<String>,
        mode: String,
        arg: Option<String>,
    },
    /// Coalesced run of consecutive presence/state events. `events` holds
    /// every absorbed original in order; `replaced` is the lineage of ids
    /// this bunch supersedes (every prior tail id, oldest first).
    Bunch {
        events: Vec<CanonicalEvent>,
        replaced: Vec<EventId>,
    },
}

impl CanonicalEvent {
    /// Whether this event participates in bunching. Messages, actions,
    /// and kicks never bunch; an existing bunch can absorb further
    /// events.
    pub fn is_bunchable(&self) -> bool {
        matches!(
            self.body,
            EventBody::Join { .. }
                | EventBody::Part { .. }
                | EventBody::Quit { .. }
                | EventBody::Kill { .. }
                | EventBody::Mode { .. }
        )
    }

    pub fn is_bunch(&self) -> bool {
        matches!(self.body, EventBody::Bunch { .. })
    }

    /// The username that initiated the event, if one did.
    pub fn actor(&self) -> Option<&str> {
        match &self.body {
            EventBody::Message { from, .. } | EventBody::Action { from, .. } => Some(from),
            EventBody::Join { who }
            | EventBody::Part { who, .. }
            | EventBody::Quit { who, .. } => Some(who),
            // For kicks and kills the *initiator* is the operator issuing
            // them, not the removed user.
            EventBody::Kick { by, .. } | EventBody::Kill { by, .. } => Some(by),
            EventBody::Mode { by, .. } => by.as_deref(),
            EventBody::Bunch { .. } => None,
        }
    }

    /// Stable lowercase kind tag, used as a structured log field.
    pub fn kind_str(&self) -> &'static str {
        match &self.body {
            EventBody::Message { .. } => "msg",
            EventBody::Action { .. } => "action",
            EventBody::Join { .. } => "join",
            EventBody::Part { .. } => "part",
            EventBody::Quit { .. } => "quit",
            EventBody::Kick { .. } => "kick",
            EventBody::Kill { .. } => "kill",
            EventBody::Mode { .. } => "mode",
            EventBody::Bunch { .. } => "bunch",
        }
    }
}
