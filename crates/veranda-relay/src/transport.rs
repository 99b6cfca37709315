//! The seam between the engine and the protocol client.
//!
//! Wire framing, the authentication handshake, and reconnect backoff all
//! live behind [`ChatTransport`]; the engine only ever sees decoded
//! [`InboundEvent`]s and issues message/action sends. A transport adapter
//! is expected to resolve each callback to a single subject before
//! handing it over (a network-wide quit becomes one event per affected
//! channel).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use veranda_shared::config::NetworkConfig;
use veranda_shared::types::{ConnectionStatus, NetworkId, SubjectKind};

/// Errors crossing the transport seam.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// One decoded protocol callback, already targeted at a single subject.
#[derive(Debug, Clone)]
pub enum RawEvent {
    Message {
        from: String,
        text: String,
    },
    Action {
        from: String,
        text: String,
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
    /// Full user-list snapshot for a channel.
    UserList {
        users: Vec<String>,
    },
}

/// Envelope a transport pushes into the engine for every callback.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub network: NetworkId,
    pub subject_kind: SubjectKind,
    pub subject_name: String,
    pub raw: RawEvent,
    /// Wall clock is used when `None`; replay and tests supply a value.
    pub at: Option<DateTime<Utc>>,
}

/// Handle to one live protocol connection. Reconnection with backoff is
/// the implementation's own business; the engine only reads `status`.
pub trait ChatTransport: Send + Sync {
    /// Start connecting. Must not block on the handshake.
    fn connect(&self) -> Result<(), TransportError>;

    /// Send a plain message to a channel or nick.
    fn send_message(&self, target: &str, text: &str) -> Result<(), TransportError>;

    /// Send an action ("/me") to a channel or nick.
    fn send_action(&self, target: &str, text: &str) -> Result<(), TransportError>;

    fn status(&self) -> ConnectionStatus;
}

/// Builds one [`ChatTransport`] per configured network. The factory
/// receives the sender half of the engine's inbound event channel so the
/// transport can push decoded callbacks as they arrive.
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        config: &NetworkConfig,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<Arc<dyn ChatTransport>, TransportError>;
}
