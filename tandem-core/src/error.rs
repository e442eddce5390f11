//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A slot index out of the range of the buffer.
    #[error("Slot {0} is out of range (n_slots = {1})")]
    SlotOutOfRange(usize, usize),

    /// A transition was added to a slot whose trajectory has been removed.
    #[error("Trajectory of slot {0} has been discarded until the next reset")]
    InvalidTrajectory(usize),

    /// The terms returned by a policy carry a reward.
    #[error("Terms returned by the policy must not contain 'reward'")]
    RewardInTerms,

    /// Fields of an [`EnvOutput`](crate::EnvOutput) disagree on the batch size.
    #[error("Batch size mismatch in EnvOutput: {0}")]
    BatchSizeMismatch(String),
}
