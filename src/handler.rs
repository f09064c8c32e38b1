//! Completion and progress notifications
//!
//! Whenever an asynchronous operation reaches a terminal state, it tells its
//! completion handler about it, synchronously, on the thread that performed
//! the state transition. Operations, sequences, promise links and arbitrary
//! client callbacks all receive these notifications through the same
//! interface.
//!
//! Progress, on the other hand, flows through an optional progress sink. An
//! operation without a sink of its own borrows the sink of whichever operation
//! its completion handler represents, so that a client which only holds the
//! last operation of a chain still hears about the progress of the first one.

use crate::operation::AsyncOperation;
use std::rc::{Rc, Weak};


/// Entity which wants to be told when an operation reaches a terminal state
pub trait CompletionHandler {
    /// Called once the operation's state is terminal
    ///
    /// The operation's state has already been updated when this is called.
    ///
    fn on_completion(&self, operation: &AsyncOperation);

    /// Operation which this handler stands for, if any
    ///
    /// Used to forward progress queries along operation chains.
    ///
    fn as_operation(&self) -> Option<AsyncOperation> {
        None
    }
}


/// Build a completion handler out of a closure
pub fn handler_fn<F>(callback: F) -> Rc<dyn CompletionHandler>
    where F: Fn(&AsyncOperation) + 'static
{
    Rc::new(FnCompletionHandler { callback })
}


/// Completion handler which invokes a closure
struct FnCompletionHandler<F: Fn(&AsyncOperation)> {
    callback: F,
}
//
impl<F: Fn(&AsyncOperation)> CompletionHandler for FnCompletionHandler<F> {
    fn on_completion(&self, operation: &AsyncOperation) {
        (self.callback)(operation);
    }
}


/// Reference to a collaborator, which may or may not keep it alive
pub(crate) enum Link<T: ?Sized> {
    /// Keeps the target alive
    Strong(Rc<T>),

    /// Does not keep the target alive, the target must outlive its usefulness
    Weak(Weak<T>),
}
//
impl<T: ?Sized> Link<T> {
    /// Access the target, if it is still around
    pub(crate) fn upgrade(&self) -> Option<Rc<T>> {
        match self {
            Link::Strong(target) => Some(target.clone()),
            Link::Weak(target) => target.upgrade(),
        }
    }
}


/// Snapshot of the progress of some work
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Progress {
    /// Completed fraction of the work, between 0 and 1
    pub fraction: f32,

    /// Optional human-readable description of the current activity
    pub text: Option<String>,
}
//
impl Progress {
    /// Progress report without description
    pub fn new(fraction: f32) -> Self {
        Progress {
            fraction: fraction.clamp(0.0, 1.0),
            text: None,
        }
    }

    /// Attach a description to a progress report
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}


/// Receiver of progress reports
pub trait ProgressSink {
    /// Record a new progress report
    fn update_progress(&self, progress: Progress);

    /// Whether whoever watches the progress would like the work to stop
    fn is_canceled(&self) -> bool {
        false
    }
}
