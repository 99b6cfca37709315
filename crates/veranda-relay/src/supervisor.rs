//! Network connection supervision and subject-identity resolution.
//!
//! Owns one transport handle per configured network and the
//! multi-network collision set: any bare channel name configured on more
//! than one network must be displayed qualified by its network, while
//! unambiguous names stay bare.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use veranda_shared::config::NetworkConfig;
use veranda_shared::types::{ConnectionStatus, NetworkId, SubjectId};

use crate::transport::{ChatTransport, InboundEvent, TransportFactory};

/// One supervised network connection.
pub struct NetworkConnection {
    pub id: NetworkId,
    pub config: NetworkConfig,
    /// `None` when the transport could not even be built; the entry is
    /// kept so its failed status stays visible.
    pub transport: Option<Arc<dyn ChatTransport>>,
    /// Channels this connection currently has joined.
    pub joined: HashSet<String>,
}

impl NetworkConnection {
    pub fn status(&self) -> ConnectionStatus {
        match &self.transport {
            Some(t) => t.status(),
            None => ConnectionStatus::Failed,
        }
    }
}

/// Snapshot of one connection, surfaced to viewers as a status signal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSnapshot {
    pub network: NetworkId,
    pub status: ConnectionStatus,
    pub joined: Vec<String>,
}

/// Supervises every configured network connection.
pub struct ConnectionSupervisor {
    /// Connections in declaration order.
    connections: Vec<NetworkConnection>,
    /// Bare channel names configured on more than one network.
    multi_network: HashSet<String>,
}

impl ConnectionSupervisor {
    /// Build and connect one transport per configured network. A single
    /// network failing never prevents the others from connecting; the
    /// failed entry is kept with a `Failed` status. Retry policy is the
    /// transport's own concern.
    pub fn connect_all(
        configs: &[NetworkConfig],
        factory: &dyn TransportFactory,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> Self {
        let mut connections = Vec::with_capacity(configs.len());

        for config in configs {
            let id = NetworkId::new(config.id.clone());
            let transport = match factory.build(config, events.clone()) {
                Ok(transport) => {
                    if let Err(e) = transport.connect() {
                        warn!(network = %id, error = %e, "Connect failed, transport will retry");
                    } else {
                        info!(network = %id, host = %config.host, "Connecting to network");
                    }
                    Some(transport)
                }
                Err(e) => {
                    warn!(network = %id, error = %e, "Could not build transport for network");
                    None
                }
            };

            connections.push(NetworkConnection {
                id,
                config: config.clone(),
                transport,
                joined: HashSet::new(),
            });
        }

        let mut supervisor = Self {
            connections,
            multi_network: HashSet::new(),
        };
        supervisor.recalibrate_subject_collisions();
        supervisor
    }

    /// Recompute the multi-network collision set from configuration.
    /// Idempotent and safe to call at any time; the previous set is
    /// replaced wholesale, never merged into.
    pub fn recalibrate_subject_collisions(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut multi: HashSet<String> = HashSet::new();

        for conn in &self.connections {
            for channel in &conn.config.channels {
                let bare = channel.trim_start_matches(['#', '&']).to_string();
                if !seen.insert(bare.clone()) {
                    multi.insert(bare);
                }
            }
        }

        debug!(collisions = multi.len(), "Recalibrated subject collisions");
        self.multi_network = multi;
    }

    /// Look up the connection for a network id.
    pub fn find_connection(&self, network: &NetworkId) -> Option<&NetworkConnection> {
        self.connections.iter().find(|c| &c.id == network)
    }

    fn find_connection_mut(&mut self, network: &NetworkId) -> Option<&mut NetworkConnection> {
        self.connections.iter_mut().find(|c| &c.id == network)
    }

    /// Status snapshot of every connection, in declaration order.
    pub fn list_connections(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .iter()
            .map(|c| {
                let mut joined: Vec<String> = c.joined.iter().cloned().collect();
                joined.sort();
                ConnectionSnapshot {
                    network: c.id.clone(),
                    status: c.status(),
                    joined,
                }
            })
            .collect()
    }

    /// Whether a bare subject name exists on more than one network.
    pub fn is_multi_network(&self, bare_name: &str) -> bool {
        self.multi_network.contains(bare_name)
    }

    /// The name a renderer should use for a subject: qualified by its
    /// network when the bare name collides across networks, bare otherwise.
    pub fn display_name(&self, subject: &SubjectId) -> String {
        if self.is_multi_network(subject.bare_name()) {
            format!("{}@{}", subject.name, subject.network)
        } else {
            subject.name.clone()
        }
    }

    /// Record that our own nick joined a channel on a network.
    pub fn note_joined(&mut self, network: &NetworkId, channel: &str) {
        if let Some(conn) = self.find_connection_mut(network) {
            conn.joined.insert(channel.to_string());
        }
    }

    /// Record that our own nick left (or was removed from) a channel.
    pub fn note_left(&mut self, network: &NetworkId, channel: &str) {
        if let Some(conn) = self.find_connection_mut(network) {
            conn.joined.remove(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{ChatTransport, TransportError, TransportFactory};

    struct NullTransport;

    impl ChatTransport for NullTransport {
        fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn send_message(&self, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
        fn send_action(&self, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
        fn status(&self) -> ConnectionStatus {
            ConnectionStatus::Connected
        }
    }

    /// Factory that refuses to build transports for one network id.
    struct FlakyFactory {
        fail_for: &'static str,
    }

    impl TransportFactory for FlakyFactory {
        fn build(
            &self,
            config: &NetworkConfig,
            _events: mpsc::UnboundedSender<InboundEvent>,
        ) -> Result<Arc<dyn ChatTransport>, TransportError> {
            if config.id == self.fail_for {
                Err(TransportError::Connect("refused".into()))
            } else {
                Ok(Arc::new(NullTransport))
            }
        }
    }

    fn network(id: &str, channels: &[&str]) -> NetworkConfig {
        NetworkConfig {
            id: id.into(),
            host: format!("irc.{id}.org"),
            port: 6697,
            tls: true,
            nick: None,
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn supervisor(configs: &[NetworkConfig]) -> ConnectionSupervisor {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionSupervisor::connect_all(configs, &FlakyFactory { fail_for: "" }, tx)
    }

    #[test]
    fn test_collision_detection() {
        let sup = supervisor(&[
            network("efnet", &["#general", "#rust"]),
            network("libera", &["#general", "#linux"]),
        ]);

        assert!(sup.is_multi_network("general"));
        assert!(!sup.is_multi_network("rust"));
        assert!(!sup.is_multi_network("linux"));
    }

    #[test]
    fn test_recalibrate_replaces_previous_set() {
        let mut sup = supervisor(&[
            network("efnet", &["#general"]),
            network("libera", &["#general"]),
        ]);
        assert!(sup.is_multi_network("general"));

        // Drop one of the colliding channels from configuration.
        sup.connections[1].config.channels.clear();
        sup.recalibrate_subject_collisions();
        assert!(!sup.is_multi_network("general"));

        // Recalibrating twice changes nothing.
        sup.recalibrate_subject_collisions();
        assert!(!sup.is_multi_network("general"));
    }

    #[test]
    fn test_display_name_qualification() {
        let sup = supervisor(&[
            network("efnet", &["#general", "#rust"]),
            network("libera", &["#general"]),
        ]);

        let ambiguous = SubjectId::channel("efnet", "#general");
        let unique = SubjectId::channel("efnet", "#rust");
        assert_eq!(sup.display_name(&ambiguous), "#general@efnet");
        assert_eq!(sup.display_name(&unique), "#rust");
    }

    #[test]
    fn test_one_failed_network_does_not_block_others() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sup = ConnectionSupervisor::connect_all(
            &[network("efnet", &[]), network("broken", &[])],
            &FlakyFactory { fail_for: "broken" },
            tx,
        );

        let snapshots = sup.list_connections();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].status, ConnectionStatus::Connected);
        assert_eq!(snapshots[1].status, ConnectionStatus::Failed);
    }

    #[test]
    fn test_joined_tracking() {
        let mut sup = supervisor(&[network("efnet", &["#general"])]);
        let id = NetworkId::new("efnet");

        sup.note_joined(&id, "#general");
        assert_eq!(sup.list_connections()[0].joined, vec!["#general"]);

        sup.note_left(&id, "#general");
        assert!(sup.list_connections()[0].joined.is_empty());
    }
}
