//! Relay configuration loaded from a JSON file.
//!
//! A malformed individual network entry is reported and dropped; the
//! remaining networks proceed. Only a config file that fails to parse at
//! all is a hard error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_CACHE_CAPACITY, DEFAULT_IRC_PORT, DEFAULT_LAST_SEEN_INTERVAL_MS,
};
use crate::error::ConfigError;
use crate::types::Relationship;

/// One configured chat network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// User-chosen identifier, used everywhere a network is referenced.
    pub id: String,

    /// Server hostname.
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to connect over TLS.
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Nick to use on this network; falls back to the operator nick.
    #[serde(default)]
    pub nick: Option<String>,

    /// Channels to join on connect, in declaration order. Declaration
    /// order is what drives multi-network collision detection.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_IRC_PORT
}

fn default_true() -> bool {
    true
}

/// Full relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Networks to connect to, in declaration order.
    pub networks: Vec<NetworkConfig>,

    /// The operator's primary nick; highlight matching and outgoing
    /// loopback both use it.
    pub nick: String,

    /// Additional nicknames that count as a mention of the operator.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Relationship tier per person. Anyone absent defaults to no tier.
    #[serde(default)]
    pub people: HashMap<String, Relationship>,

    /// Actors that are not people (bots). Their events are text-logged
    /// but never cached, fanned out, or counted as activity.
    #[serde(default)]
    pub not_people: Vec<String>,

    /// Cache entries retained per subject.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Milliseconds between batched last-seen broadcasts.
    #[serde(default = "default_last_seen_interval_ms")]
    pub last_seen_interval_ms: u64,

    /// Directory for the persisted last-seen stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory for the human-readable text logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_last_seen_interval_ms() -> u64 {
    DEFAULT_LAST_SEEN_INTERVAL_MS
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl RelayConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RelayConfig = serde_json::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    /// Load configuration from the path named by `VERANDA_CONFIG`,
    /// falling back to `./veranda.json`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./veranda.json"));
        Self::load(&path)
    }

    /// Drop malformed or duplicate network entries, keeping the rest.
    /// Each rejection is reported individually.
    pub fn validate(&mut self) {
        let mut seen_ids: Vec<String> = Vec::new();

        self.networks.retain(|net| {
            if net.id.trim().is_empty() {
                warn!(host = %net.host, "Dropping network entry with empty id");
                return false;
            }
            if net.host.trim().is_empty() {
                warn!(network = %net.id, "Dropping network entry with empty host");
                return false;
            }
            if net.port == 0 {
                warn!(network = %net.id, "Dropping network entry with port 0");
                return false;
            }
            if seen_ids.iter().any(|id| id == &net.id) {
                warn!(network = %net.id, "Dropping duplicate network entry");
                return false;
            }
            seen_ids.push(net.id.clone());
            true
        });

        if self.cache_capacity == 0 {
            warn!("cache_capacity 0 is invalid, using default");
            self.cache_capacity = DEFAULT_CACHE_CAPACITY;
        }
    }

    /// Relationship tier for a username (case-insensitive), defaulting
    /// to no tier for unrecognized people.
    pub fn relationship_of(&self, username: &str) -> Relationship {
        self.people
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(username))
            .map(|(_, tier)| *tier)
            .unwrap_or(Relationship::None)
    }

    /// Whether a username is on the "not a person" exclusion list.
    pub fn is_excluded(&self, username: &str) -> bool {
        self.not_people
            .iter()
            .any(|name| name.eq_ignore_ascii_case(username))
    }

    /// Every string that counts as a mention of the operator.
    pub fn highlight_names(&self) -> Vec<&str> {
        std::iter::once(self.nick.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config() -> RelayConfig {
        RelayConfig {
            networks: vec![NetworkConfig {
                id: "efnet".into(),
                host: "irc.efnet.org".into(),
                port: 6697,
                tls: true,
                nick: None,
                channels: vec!["#general".into()],
            }],
            nick: "op".into(),
            aliases: vec![],
            people: HashMap::new(),
            not_people: vec![],
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            last_seen_interval_ms: DEFAULT_LAST_SEEN_INTERVAL_MS,
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }

    #[test]
    fn test_validate_drops_bad_entries_keeps_rest() {
        let mut config = base_config();
        config.networks.push(NetworkConfig {
            id: "".into(),
            host: "irc.example.org".into(),
            port: 6697,
            tls: true,
            nick: None,
            channels: vec![],
        });
        config.networks.push(NetworkConfig {
            id: "libera".into(),
            host: "irc.libera.chat".into(),
            port: 6697,
            tls: true,
            nick: None,
            channels: vec![],
        });

        config.validate();
        let ids: Vec<_> = config.networks.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["efnet", "libera"]);
    }

    #[test]
    fn test_validate_drops_duplicate_ids() {
        let mut config = base_config();
        config.networks.push(config.networks[0].clone());
        config.validate();
        assert_eq!(config.networks.len(), 1);
    }

    #[test]
    fn test_relationship_lookup_case_insensitive() {
        let mut config = base_config();
        config.people.insert("Alice".into(), Relationship::Friend);
        assert_eq!(config.relationship_of("alice"), Relationship::Friend);
        assert_eq!(config.relationship_of("stranger"), Relationship::None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("veranda.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r##"{{
                "nick": "op",
                "networks": [
                    {{"id": "efnet", "host": "irc.efnet.org", "channels": ["#a"]}}
                ],
                "people": {{"alice": "best_friend"}}
            }}"##
        )
        .unwrap();
        drop(f);

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.networks[0].port, DEFAULT_IRC_PORT);
        assert!(config.networks[0].tls);
        assert_eq!(config.relationship_of("alice"), Relationship::BestFriend);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(RelayConfig::load(Path::new("/nonexistent/veranda.json")).is_err());
    }
}
