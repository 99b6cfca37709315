use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the engine handle.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The engine task has stopped (or was never started).
    #[error("relay engine is not running")]
    EngineStopped,

    /// The persisted last-seen store could not be loaded at startup.
    #[error("store error: {0}")]
    Store(#[from] veranda_store::StoreError),
}

/// Why an outbound message could not be delivered. None of these trigger
/// an automatic retry; retrying is the caller's decision.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("no network configured with id '{0}'")]
    UnknownNetwork(String),

    #[error("network '{0}' is not connected")]
    NotConnected(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("relay engine is not running")]
    EngineStopped,
}
