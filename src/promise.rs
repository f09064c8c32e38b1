//! Promises, i.e. continuation chains on top of asynchronous operations
//!
//! A `Promise` wraps an operation and lets clients register what should happen
//! once that operation is over. Each continuation produces a new link
//! operation which finishes after the continuation ran, so continuations can
//! be chained, cancelled from the end of the chain, and observed for progress
//! from the end of the chain.

use crate::client::AsyncCancel;
use crate::handler::{handler_fn, CompletionHandler, Link};
use crate::operation::AsyncOperation;
use crate::status::AsyncState;
use std::cell::RefCell;
use std::ops::Deref;
use std::rc::{Rc, Weak};


/// Handle to the eventual outcome of an asynchronous operation
#[derive(Clone, Debug)]
pub struct Promise {
    operation: AsyncOperation,
}
//
impl Promise {
    /// Wrap an operation
    pub fn new(operation: AsyncOperation) -> Self {
        Promise { operation }
    }

    /// Wrap an operation which may be missing, in which case it is considered
    /// to have failed
    pub fn from_option(operation: Option<AsyncOperation>) -> Self {
        Promise::new(operation.unwrap_or_else(|| AsyncOperation::failed(false)))
    }

    /// Operation behind this promise
    pub fn operation(&self) -> &AsyncOperation {
        &self.operation
    }

    /// Extract the operation behind this promise
    pub fn into_operation(self) -> AsyncOperation {
        self.operation
    }

    /// Run a closure once the operation is over
    ///
    /// The returned promise finishes after the closure ran, with the result
    /// and state of this promise's operation (as left by the closure).
    ///
    pub fn then<F>(&self, callback: F) -> Promise
        where F: Fn(&AsyncOperation) + 'static
    {
        self.then_handler(handler_fn(callback))
    }

    /// Notify a completion handler once the operation is over
    ///
    /// This replaces the operation's current completion handler.
    ///
    pub fn then_handler(&self, handler: Rc<dyn CompletionHandler>) -> Promise {
        self.chain(ChainAction::Notify(handler))
    }

    /// Decide the state of the next link from the outcome of this one
    ///
    /// The returned promise adopts this promise's result, but its state is
    /// whatever the modifier returns.
    ///
    pub fn modify_state<F>(&self, modifier: F) -> Promise
        where F: Fn(&AsyncOperation) -> AsyncState + 'static
    {
        self.chain(ChainAction::ModifyState(Box::new(modifier)))
    }

    /// Attach a new link operation downstream of ours
    fn chain(&self, action: ChainAction) -> Promise {
        let link = Rc::new(ChainLink {
            operation: AsyncOperation::new(),
            upstream: RefCell::new(Some(self.operation.clone())),
            action,
        });
        let weak_link: Weak<ChainLink> = Rc::downgrade(&link);
        let weak_link: Weak<dyn AsyncCancel> = weak_link;
        link.operation.set_cancel_target(Some(Link::Weak(weak_link)));

        // Once attached, the upstream operation owns the link until it is done
        let downstream = link.operation.clone();
        self.operation.set_completion_handler(link);
        Promise::new(downstream)
    }
}
//
impl Deref for Promise {
    type Target = AsyncOperation;

    fn deref(&self) -> &AsyncOperation {
        &self.operation
    }
}
//
impl From<AsyncOperation> for Promise {
    fn from(operation: AsyncOperation) -> Self {
        Promise::new(operation)
    }
}


/// What a chain link does once the upstream operation is over
enum ChainAction {
    /// Notify a handler, then adopt the upstream state
    Notify(Rc<dyn CompletionHandler>),

    /// Compute the new state from the upstream operation
    ModifyState(Box<dyn Fn(&AsyncOperation) -> AsyncState>),
}


/// Downstream side of a promise continuation
struct ChainLink {
    /// Operation which finishes after the continuation ran
    operation: AsyncOperation,

    /// Upstream operation, held until it is done
    upstream: RefCell<Option<AsyncOperation>>,

    /// Continuation
    action: ChainAction,
}
//
impl CompletionHandler for ChainLink {
    fn on_completion(&self, upstream: &AsyncOperation) {
        self.operation.set_state(AsyncState::Started);

        match &self.action {
            ChainAction::Notify(handler) => {
                handler.on_completion(upstream);
                self.operation.set_result(upstream.result());
                self.operation.set_state(upstream.state());
            }
            ChainAction::ModifyState(modifier) => {
                self.operation.set_result(upstream.result());
                let state = modifier(upstream);
                self.operation.set_state(state);
            }
        }

        let released = self.upstream.borrow_mut().take();
        drop(released);
    }

    fn as_operation(&self) -> Option<AsyncOperation> {
        Some(self.operation.clone())
    }
}
//
impl AsyncCancel for ChainLink {
    fn cancel(&self) {
        let upstream = self.upstream.borrow().clone();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
