//! Turns raw protocol callbacks into canonical events.
//!
//! Besides the type conversion this is where per-event policy lives:
//! relationship-tier resolution, highlight matching against the
//! operator's nicks, the "not a person" exclusion list, and the
//! human-readable text log side channel. Log writes never abort event
//! processing; a failure is reported and the event proceeds.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use veranda_shared::config::RelayConfig;
use veranda_shared::constants::{CATEGORY_FRIEND_PREFIX, CATEGORY_MENTIONS};
use veranda_shared::event::{CanonicalEvent, EventBody};
use veranda_shared::types::{EventId, Relationship, SubjectId};
use veranda_store::ChatLogSink;

use crate::transport::RawEvent;

/// Normalizes raw callbacks and writes the text log side channel.
pub struct EventNormalizer {
    nick: String,
    /// Lowercased operator nick plus aliases, for highlight matching.
    highlight_names: Vec<String>,
    people: Vec<(String, Relationship)>,
    not_people: Vec<String>,
    sink: ChatLogSink,
}

impl EventNormalizer {
    pub fn new(config: &RelayConfig, sink: ChatLogSink) -> Self {
        Self {
            nick: config.nick.clone(),
            highlight_names: config
                .highlight_names()
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
            people: config
                .people
                .iter()
                .map(|(name, tier)| (name.clone(), *tier))
                .collect(),
            not_people: config.not_people.clone(),
            sink,
        }
    }

    /// The operator's own nick, used for outgoing loopback.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Normalize one callback into a [`CanonicalEvent`].
    ///
    /// Returns `None` for events that must not enter the pipeline: the
    /// actor is on the exclusion list (still text-logged), or the shape
    /// is not cacheable (user lists, which the engine handles itself).
    /// `at` is caller-suppliable for replay and tests.
    pub fn normalize(
        &self,
        subject: &SubjectId,
        display_subject: &str,
        raw: RawEvent,
        at: Option<DateTime<Utc>>,
    ) -> Option<CanonicalEvent> {
        let at = at.unwrap_or_else(Utc::now);

        let body = match raw {
            RawEvent::Message { from, text } => {
                let highlights = self.find_highlights(&text);
                EventBody::Message {
                    from,
                    text,
                    highlights,
                }
            }
            RawEvent::Action { from, text } => {
                let highlights = self.find_highlights(&text);
                EventBody::Action {
                    from,
                    text,
                    highlights,
                }
            }
            RawEvent::Join { who } => EventBody::Join { who },
            RawEvent::Part { who, reason } => EventBody::Part { who, reason },
            RawEvent::Quit { who, reason } => EventBody::Quit { who, reason },
            RawEvent::Kick { who, by, reason } => EventBody::Kick { who, by, reason },
            RawEvent::Kill { who, by, reason } => EventBody::Kill { who, by, reason },
            RawEvent::Mode { by, mode, arg } => EventBody::Mode { by, mode, arg },
            RawEvent::UserList { .. } => return None,
        };

        let mut event = CanonicalEvent {
            id: EventId::new(),
            at,
            subject: subject.clone(),
            relationship: Relationship::None,
            body,
        };
        let tier = event
            .actor()
            .map(|actor| self.relationship_of(actor))
            .unwrap_or(Relationship::None);
        event.relationship = tier;

        self.write_logs(&event, display_subject);

        if let Some(actor) = event.actor() {
            if self.is_excluded(actor) {
                debug!(actor, subject = %subject, "Excluding non-person event");
                return None;
            }
        }

        Some(event)
    }

    fn relationship_of(&self, username: &str) -> Relationship {
        self.people
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(username))
            .map(|(_, tier)| *tier)
            .unwrap_or(Relationship::None)
    }

    fn is_excluded(&self, username: &str) -> bool {
        self.not_people
            .iter()
            .any(|name| name.eq_ignore_ascii_case(username))
    }

    /// Case-insensitive whole-word matches of the operator's nicks in a
    /// message text. Returns the configured names that matched.
    fn find_highlights(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.highlight_names
            .iter()
            .filter(|name| contains_word(&lower, name))
            .cloned()
            .collect()
    }

    /// Write the per-subject line plus any category lines. I/O failures
    /// are surfaced to the operational log and otherwise ignored.
    fn write_logs(&self, event: &CanonicalEvent, display_subject: &str) {
        let Some(line) = render_line(event) else {
            return;
        };
        let date = event.at.date_naive();
        let network = event.subject.network.as_str();

        if let Err(e) = self
            .sink
            .subject_line(network, &event.subject.name, date, &line)
        {
            warn!(subject = %event.subject, error = %e, "Failed to write chat log line");
        }

        let mentioned = matches!(
            &event.body,
            EventBody::Message { highlights, .. } | EventBody::Action { highlights, .. }
                if !highlights.is_empty()
        );
        if mentioned {
            let categorized = format!("{} {}", display_subject, line);
            if let Err(e) = self.sink.category_line(CATEGORY_MENTIONS, date, &categorized) {
                warn!(error = %e, "Failed to write mentions log line");
            }
        }

        if event.relationship >= Relationship::Friend {
            if let Some(actor) = event.actor() {
                let category = format!("{}{}", CATEGORY_FRIEND_PREFIX, actor.to_lowercase());
                let categorized = format!("{} {}", display_subject, line);
                if let Err(e) = self.sink.category_line(&category, date, &categorized) {
                    warn!(category, error = %e, "Failed to write friend log line");
                }
            }
        }
    }
}

/// Render the human-readable log line for an event. Bunches are never
/// rendered (they only exist inside the cache).
fn render_line(event: &CanonicalEvent) -> Option<String> {
    let time = event.at.format("%H:%M:%S");
    let line = match &event.body {
        EventBody::Message { from, text, .. } => format!("{time} <{from}> {text}"),
        EventBody::Action { from, text, .. } => format!("{time} * {from} {text}"),
        EventBody::Join { who } => format!("{time} -- {who} joined"),
        EventBody::Part { who, reason } => match reason {
            Some(reason) => format!("{time} -- {who} left ({reason})"),
            None => format!("{time} -- {who} left"),
        },
        EventBody::Quit { who, reason } => match reason {
            Some(reason) => format!("{time} -- {who} quit ({reason})"),
            None => format!("{time} -- {who} quit"),
        },
        EventBody::Kick { who, by, reason } => match reason {
            Some(reason) => format!("{time} -- {who} was kicked by {by} ({reason})"),
            None => format!("{time} -- {who} was kicked by {by}"),
        },
        EventBody::Kill { who, by, reason } => match reason {
            Some(reason) => format!("{time} -- {who} was killed by {by} ({reason})"),
            None => format!("{time} -- {who} was killed by {by}"),
        },
        EventBody::Mode { by, mode, arg } => {
            let detail = match arg {
                Some(arg) => format!("{mode} {arg}"),
                None => mode.clone(),
            };
            match by {
                Some(by) => format!("{time} -- mode {detail} by {by}"),
                None => format!("{time} -- mode {detail}"),
            }
        }
        EventBody::Bunch { .. } => return None,
    };
    Some(line)
}

/// Whole-word containment: the needle must not be flanked by word
/// characters (letters, digits, underscore). Both sides are expected to
/// be lowercased already.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();

        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));

        if before_ok && after_ok {
            return true;
        }

        // Advance one full character to stay on a UTF-8 boundary.
        from = start
            + haystack[start..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
