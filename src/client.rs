//! Minimal asynchronous operation client interface
//!
//! The details of how a client monitors an asynchronous operation vary a lot:
//! it may attach a completion handler, chain promises, or poll progress from
//! another thread. However, one service which is common to all asynchronous
//! operation clients is the ability to request cancellation.
//!
//! Note that cancellation is cooperative. A request does not immediately stop
//! anything: the target decides how to honor it, and the outcome is only known
//! once the operation reports a terminal state. Whoever implements the work
//! behind an operation should check for cancellation requests and terminate
//! early whenever reasonably feasible.


/// Features which all asynchronous operation clients are expected to share
pub trait AsyncCancel {
    /// Request the cancellation of the active asynchronous operation
    fn cancel(&self);
}
