//! The relay engine: connection supervision, event normalization, the
//! bunching subject cache, recipient fan-out, last-seen tracking, and the
//! outgoing message path. Everything is owned by a single engine task;
//! external code talks to it through [`engine::EngineHandle`].

pub mod cache;
pub mod engine;
pub mod lastseen;
pub mod normalize;
pub mod outgoing;
pub mod recipients;
pub mod supervisor;
pub mod transport;

mod error;

pub use cache::{AppendOutcome, SubjectCache};
pub use engine::{spawn_engine, EngineHandle};
pub use error::{RelayError, SendError};
pub use lastseen::{LastSeenBatch, LastSeenTracker, LastSeenUpdate};
pub use normalize::EventNormalizer;
pub use outgoing::OutgoingRelay;
pub use recipients::{Push, RecipientHandle, RecipientId, RecipientRegistry};
pub use supervisor::{ConnectionSnapshot, ConnectionSupervisor, NetworkConnection};
pub use transport::{ChatTransport, InboundEvent, RawEvent, TransportError, TransportFactory};
