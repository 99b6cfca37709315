use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-chosen identifier for a configured network (not the wire address).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a subject is a channel or a direct conversation with a person.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Channel,
    Person,
}

/// The unit of caching, subscription, and last-seen tracking: a
/// (network, channel-or-person) pair. Two subjects with the same bare
/// name on different networks are distinct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubjectId {
    pub network: NetworkId,
    pub kind: SubjectKind,
    pub name: String,
}

impl SubjectId {
    pub fn channel(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network: NetworkId::new(network),
            kind: SubjectKind::Channel,
            name: name.into(),
        }
    }

    pub fn person(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network: NetworkId::new(network),
            kind: SubjectKind::Person,
            name: name.into(),
        }
    }

    /// Bare name with any channel sigil stripped, as used for
    /// multi-network collision detection and display qualification.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches(['#', '&'])
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.network)
    }
}

/// Unique identifier of a canonical event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relationship tier of a person. Ordered so that `tier >= Friend`
/// selects everyone whose activity feeds the per-person last-seen store.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    #[default]
    None,
    Friend,
    BestFriend,
}

/// Live status of one network connection, surfaced to viewers as a
/// connection-status signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_ordering() {
        assert!(Relationship::Friend > Relationship::None);
        assert!(Relationship::BestFriend > Relationship::Friend);
        assert!(Relationship::Friend >= Relationship::Friend);
    }

    #[test]
    fn test_bare_name_strips_sigil() {
        assert_eq!(SubjectId::channel("efnet", "#general").bare_name(), "general");
        assert_eq!(SubjectId::channel("efnet", "&local").bare_name(), "local");
        assert_eq!(SubjectId::person("efnet", "alice").bare_name(), "alice");
    }

    #[test]
    fn test_subject_identity_distinct_per_network() {
        let a = SubjectId::channel("efnet", "#general");
        let b = SubjectId::channel("libera", "#general");
        assert_ne!(a, b);
        assert_eq!(a.bare_name(), b.bare_name());
    }
}
