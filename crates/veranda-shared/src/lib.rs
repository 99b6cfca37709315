//! # veranda-shared
//!
//! Domain types shared by every Veranda crate: subject identities, the
//! canonical event model, relay configuration, and the common error
//! taxonomy. Nothing in here does I/O except [`config::RelayConfig::load`].

pub mod config;
pub mod constants;
pub mod event;
pub mod types;

mod error;

pub use config::{NetworkConfig, RelayConfig};
pub use error::ConfigError;
pub use event::{CanonicalEvent, EventBody};
pub use types::{ConnectionStatus, EventId, NetworkId, Relationship, SubjectId, SubjectKind};
