//! Errors reported when sequences are misused

use thiserror::Error;

/// Misuse of an `AsyncSequence`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SequenceError {
    #[error("sequence is already running")]
    AlreadyStarted,

    #[error("sequence has no step to attach a completion handler to")]
    NoSteps,

    #[error("step {index} already has a completion handler")]
    HandlerAlreadySet { index: usize },
}
