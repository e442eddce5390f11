//! Errors of remote workers, managers and the coordinator.
use crate::{Identifier, WorkerId};
use thiserror::Error;

/// Errors of remote workers, managers and the coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributedError {
    /// The factories of an algorithm are not registered, or one of them failed.
    #[error("Failed to construct {role} of algorithm '{algorithm}': {reason}")]
    Construction {
        /// Role being constructed.
        role: &'static str,

        /// Algorithm name.
        algorithm: String,

        /// Cause of the failure.
        reason: String,
    },

    /// No instance has been constructed for the identifier.
    #[error("No instance for identifier '{0}'")]
    UnknownIdentifier(Identifier),

    /// A call was made in a state that does not allow it.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A role object rejected a call, e.g. weights of the wrong shape.
    #[error("Role object failed: {0}")]
    Role(String),

    /// The worker thread has stopped.
    #[error("Worker '{0}' is disconnected")]
    WorkerDisconnected(String),

    /// The manager has no worker with the id.
    #[error("Unknown worker id {0}")]
    UnknownWorker(WorkerId),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A role instance was left poisoned by a panic while it was locked.
    #[error("Instance '{0}' is poisoned")]
    Poisoned(Identifier),
}
