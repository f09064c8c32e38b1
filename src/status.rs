//! Facilities to represent the state of asynchronous operations
//!
//! The model is the following: an asynchronous operation is created in a
//! blank state, is started by whoever does the work, and finally ends up in
//! one of three terminal states. Terminal states never change anymore, with a
//! single exception: a completed operation may be explicitly restarted, which
//! is what allows a finished sequence to be run again.

use std::fmt;


/// Representation of an asynchronous operation's state
///
/// Here are the possible state transitions:
///
/// - None -> Started / Completed / Failed / Canceled
/// - Started -> Completed / Failed / Canceled
/// - Completed -> Started (explicit restart)
///
/// The variants are ordered, and apart from the restart every transition
/// moves forward in that order.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AsyncState {
    /// The operation has been created, but nobody started it yet
    #[default]
    None,

    /// Work is in progress
    Started,

    /// The work was successfully carried out, a result may be available
    Completed,

    /// The work could not be carried out
    Failed,

    /// The work was aborted, either by a client or by policy
    Canceled,
}
//
impl AsyncState {
    /// Check if a state is terminal (i.e. won't change anymore, barring an
    /// explicit restart of a completed operation)
    pub fn is_final(self) -> bool {
        self > AsyncState::Started
    }

    /// Check whether moving from this state to another one is legal
    ///
    /// Staying in the same state is not a transition, and is reported as
    /// illegal so that callers can treat it as a no-op.
    ///
    pub fn can_transition_to(self, next: AsyncState) -> bool {
        use self::AsyncState::*;
        match (self, next) {
            (current, next) if current == next => false,
            (Completed, Started) => true,
            (current, _) if current.is_final() => false,
            (current, next) => next > current,
        }
    }
}
//
impl fmt::Display for AsyncState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AsyncState::None => "none",
            AsyncState::Started => "started",
            AsyncState::Completed => "completed",
            AsyncState::Failed => "failed",
            AsyncState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}
