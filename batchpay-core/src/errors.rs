use crate::state::Phase;

/// Error types for batchpay core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An event was applied in a phase that does not accept it.
    #[error("Invalid transition: event '{event}' is not accepted in phase '{phase}'")]
    InvalidTransition { phase: Phase, event: &'static str },

    /// A per-call event referenced a call outside the plan.
    #[error("Call index {index} out of range for a plan of {len} calls")]
    CallIndexOutOfRange { index: usize, len: usize },
}

/// A specialized `Result` type for batchpay core operations.
pub type Result<T> = std::result::Result<T, Error>;
