//! The viewer-to-network send path.
//!
//! An outbound message is routed to the right network connection and,
//! once the transport accepts it, handed back to the engine as a raw
//! event under the operator's own nick — so the sender sees their
//! message through the identical pipeline as everyone else.

use tracing::debug;

use veranda_shared::constants::ACTION_PREFIX;
use veranda_shared::types::{ConnectionStatus, SubjectId};

use crate::error::SendError;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::RawEvent;

/// Routes outbound messages. Holds only the nick the loopback event is
/// attributed to.
pub struct OutgoingRelay {
    nick: String,
}

impl OutgoingRelay {
    pub fn new(nick: impl Into<String>) -> Self {
        Self { nick: nick.into() }
    }

    /// Send `text` to `subject` and return the raw event to feed back
    /// through the normal pipeline. A `/me ` prefix is stripped and the
    /// message sent as an action. No failure here is retried.
    pub fn send(
        &self,
        supervisor: &ConnectionSupervisor,
        subject: &SubjectId,
        text: &str,
    ) -> Result<RawEvent, SendError> {
        let connection = supervisor
            .find_connection(&subject.network)
            .ok_or_else(|| SendError::UnknownNetwork(subject.network.to_string()))?;

        let transport = connection
            .transport
            .as_ref()
            .ok_or_else(|| SendError::NotConnected(subject.network.to_string()))?;

        if transport.status() != ConnectionStatus::Connected {
            return Err(SendError::NotConnected(subject.network.to_string()));
        }

        let raw = if let Some(action) = text.strip_prefix(ACTION_PREFIX) {
            transport.send_action(&subject.name, action)?;
            RawEvent::Action {
                from: self.nick.clone(),
                text: action.to_string(),
            }
        } else {
            transport.send_message(&subject.name, text)?;
            RawEvent::Message {
                from: self.nick.clone(),
                text: text.to_string(),
            }
        };

        debug!(subject = %subject, "Relayed outgoing message");
        Ok(raw)
    }
}
