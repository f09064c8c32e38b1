//! Asynchronous operation objects
//!
//! An `AsyncOperation` tracks the state of some work which completes later on
//! the same thread: a dialog that is still open, a request that has not been
//! answered yet, a chain of such things. It does not know what the work is.
//! All it manages is when the work is considered done, what it produced, and
//! who should be told about it.
//!
//! Operations are reference-counted handles. Cloning one hands out another
//! reference to the same operation, which lives until the last handle is gone.

use crate::client::AsyncCancel;
use crate::executor;
use crate::handler::{CompletionHandler, Link, ProgressSink};
use crate::status::AsyncState;
use crate::value::AsyncValue;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{trace, warn};


/// Handle to an asynchronous operation
#[derive(Clone, Default)]
pub struct AsyncOperation {
    inner: Rc<OperationInner>,
}
//
impl AsyncOperation {
    /// Create a fresh operation, in the `None` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an operation which completed with some result
    ///
    /// If `deferred` is set, the result is stored right away but the
    /// transition to `Completed` is scheduled on the event queue. This gives
    /// the caller a chance to attach a completion handler first.
    ///
    pub fn completed(value: AsyncValue, deferred: bool) -> Self {
        let operation = AsyncOperation::new();
        operation.set_result(value);
        operation.apply_state(AsyncState::Completed, deferred);
        operation
    }

    /// Create an operation which failed, possibly in a deferred fashion
    pub fn failed(deferred: bool) -> Self {
        let operation = AsyncOperation::new();
        operation.apply_state(AsyncState::Failed, deferred);
        operation
    }

    /// Destroy an operation from the event queue rather than right now
    ///
    /// Needed when the last reference to an operation must go away while the
    /// operation is busy dispatching a notification about itself.
    ///
    pub fn defer_destruction(operation: AsyncOperation) {
        executor::defer_drop(operation);
    }

    /// Current state of the operation
    pub fn state(&self) -> AsyncState {
        self.inner.state.get()
    }

    /// Truth that the operation reached a terminal state
    pub fn is_final(&self) -> bool {
        self.state().is_final()
    }

    /// Result of the operation, only meaningful once it is `Completed`
    pub fn result(&self) -> AsyncValue {
        self.inner.result.borrow().clone()
    }

    /// Store a result, without changing the state or notifying anyone
    pub fn set_result(&self, value: AsyncValue) {
        *self.inner.result.borrow_mut() = value;
    }

    /// Discard the result, once it has been consumed
    pub fn close(&self) {
        let released = std::mem::take(&mut *self.inner.result.borrow_mut());
        drop(released);
    }

    /// Move to a new state
    ///
    /// Setting the current state again does nothing. Transitions which would
    /// leave a terminal state (other than restarting a completed operation)
    /// are rejected. When the new state is terminal, the completion handler is
    /// invoked after the state has been updated.
    ///
    pub fn set_state(&self, state: AsyncState) {
        let current = self.state();
        if current == state {
            return;
        }
        if !current.can_transition_to(state) {
            warn!(%current, requested = %state,
                  "rejected asynchronous operation state transition");
            return;
        }

        self.inner.state.set(state);
        trace!(from = %current, to = %state, "asynchronous operation state changed");
        if state.is_final() {
            self.notify_completion();
        }
    }

    /// Move to a new state from the event queue
    ///
    /// The scheduled task holds a reference to the operation, which therefore
    /// stays alive until the transition has happened.
    ///
    pub fn set_state_deferred(&self, state: AsyncState) {
        let operation = self.clone();
        executor::post(move || operation.set_state(state));
    }

    /// Request cancellation
    ///
    /// Operations standing for some other entity (a sequence, an upstream
    /// promise) forward the request to it. Other operations simply switch to
    /// `Canceled`, unless they already reached a terminal state.
    ///
    pub fn cancel(&self) {
        let target = self.inner.cancel_target.borrow().as_ref().and_then(Link::upgrade);
        match target {
            Some(target) => target.cancel(),
            None => {
                if !self.is_final() {
                    self.set_state(AsyncState::Canceled);
                }
            }
        }
    }

    /// Attach a completion handler which is kept alive by the operation
    ///
    /// Replaces any previous handler. If the operation is already terminal,
    /// the handler is invoked immediately.
    ///
    pub fn set_completion_handler(&self, handler: Rc<dyn CompletionHandler>) {
        self.attach_handler(Link::Strong(handler));
    }

    /// Attach a completion handler which must keep itself alive
    ///
    /// Same as `set_completion_handler`, but the operation does not own the
    /// handler. Notifications to a handler which is gone are dropped.
    ///
    pub fn set_weak_completion_handler(&self, handler: Weak<dyn CompletionHandler>) {
        self.attach_handler(Link::Weak(handler));
    }

    /// Detach the completion handler, if any
    pub fn clear_completion_handler(&self) {
        let released = self.inner.completion_handler.borrow_mut().take();
        drop(released);
    }

    /// Truth that a live completion handler is attached
    pub fn has_completion_handler(&self) -> bool {
        self.completion_handler().is_some()
    }

    /// Attach or detach the local progress sink
    pub fn set_progress_handler(&self, sink: Option<Rc<dyn ProgressSink>>) {
        *self.inner.progress_handler.borrow_mut() = sink;
    }

    /// Progress sink for the work behind this operation
    ///
    /// Without a local sink, the query is forwarded to the operation which the
    /// completion handler stands for, if any.
    ///
    pub fn progress_handler(&self) -> Option<Rc<dyn ProgressSink>> {
        if let Some(sink) = self.inner.progress_handler.borrow().clone() {
            return Some(sink);
        }
        self.completion_handler()
            .and_then(|handler| handler.as_operation())
            .and_then(|downstream| downstream.progress_handler())
    }

    /// Truth that two handles refer to the same operation
    pub fn ptr_eq(&self, other: &AsyncOperation) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Redirect cancellation requests to another entity
    pub(crate) fn set_cancel_target(&self, target: Option<Link<dyn AsyncCancel>>) {
        let released = std::mem::replace(&mut *self.inner.cancel_target.borrow_mut(),
                                         target);
        drop(released);
    }

    /// Apply a state transition now or from the event queue
    fn apply_state(&self, state: AsyncState, deferred: bool) {
        if deferred {
            self.set_state_deferred(state);
        } else {
            self.set_state(state);
        }
    }

    /// Currently attached live completion handler
    fn completion_handler(&self) -> Option<Rc<dyn CompletionHandler>> {
        self.inner.completion_handler.borrow().as_ref().and_then(Link::upgrade)
    }

    /// Replace the completion handler, then notify it if we are done already
    fn attach_handler(&self, handler: Link<dyn CompletionHandler>) {
        let released = std::mem::replace(&mut *self.inner.completion_handler.borrow_mut(),
                                         Some(handler));
        drop(released);
        if self.is_final() {
            self.notify_completion();
        }
    }

    /// Tell the completion handler that we reached a terminal state
    fn notify_completion(&self) {
        // The handler may replace itself, so no borrow is held while it runs
        if let Some(handler) = self.completion_handler() {
            handler.on_completion(self);
        }
    }
}
//
impl fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AsyncOperation")
         .field("state", &self.state())
         .field("result", &*self.inner.result.borrow())
         .finish()
    }
}


/// State shared by all handles to an operation
#[derive(Default)]
struct OperationInner {
    /// Current state
    state: Cell<AsyncState>,

    /// Result, meaningful once the state is `Completed`
    result: RefCell<AsyncValue>,

    /// Who to notify upon reaching a terminal state
    completion_handler: RefCell<Option<Link<dyn CompletionHandler>>>,

    /// Where progress reports should go
    progress_handler: RefCell<Option<Rc<dyn ProgressSink>>>,

    /// Who should handle cancellation requests instead of the operation itself
    cancel_target: RefCell<Option<Link<dyn AsyncCancel>>>,
}
