//! Sequences of asynchronous operations
//!
//! An `AsyncSequence` runs a list of steps one after another. Each step is a
//! call which starts some work and hands back the operation tracking it, or
//! nothing if the work already finished synchronously. The next step only
//! starts once the operation of the previous one reached a terminal state.
//!
//! The sequence as a whole is represented by an umbrella operation, which
//! exists while the sequence runs. It completes with the result of the last
//! step, fails when a step fails and the failure cannot be tolerated, and is
//! canceled as soon as any step is canceled. Cancelling the umbrella operation
//! cancels whichever step is currently running.

use crate::client::AsyncCancel;
use crate::error::SequenceError;
use crate::handler::{handler_fn, CompletionHandler, Link};
use crate::operation::AsyncOperation;
use crate::promise::Promise;
use crate::status::AsyncState;
use crate::value::AsyncValue;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};


/// Deferred call which starts the work of a sequence step
pub trait AsyncCall {
    /// Start the work
    ///
    /// Returns the operation tracking the work, or `None` if the work was
    /// carried out synchronously.
    ///
    fn call(&self) -> Option<AsyncOperation>;
}


/// Call which runs a closure
struct FnCall<F: Fn() -> Option<AsyncOperation>>(F);
//
impl<F: Fn() -> Option<AsyncOperation>> AsyncCall for FnCall<F> {
    fn call(&self) -> Option<AsyncOperation> {
        (self.0)()
    }
}


/// Step of a sequence, built out of its call and an optional observer
pub struct AsyncStep {
    call: Rc<dyn AsyncCall>,
    completion_handler: Option<Rc<dyn CompletionHandler>>,
}
//
impl AsyncStep {
    /// Step running a closure
    pub fn new<F>(call: F) -> Self
        where F: Fn() -> Option<AsyncOperation> + 'static
    {
        Self::from_call(Rc::new(FnCall(call)))
    }

    /// Step running an `AsyncCall`
    pub fn from_call(call: Rc<dyn AsyncCall>) -> Self {
        AsyncStep { call, completion_handler: None }
    }

    /// Run a closure once the step is over, whatever its outcome
    pub fn on_completion<F>(self, callback: F) -> Self
        where F: Fn(&AsyncOperation) + 'static
    {
        self.with_handler(handler_fn(callback))
    }

    /// Notify a completion handler once the step is over
    pub fn with_handler(mut self, handler: Rc<dyn CompletionHandler>) -> Self {
        self.completion_handler = Some(handler);
        self
    }
}


/// Ordered list of asynchronous steps, run one at a time
///
/// This is a handle: clones refer to the same sequence.
///
#[derive(Clone)]
pub struct AsyncSequence {
    inner: Rc<SequenceInner>,
}
//
impl AsyncSequence {
    /// Create an empty sequence, which tolerates failed steps
    pub fn new() -> Self {
        AsyncSequence { inner: Rc::new_cyclic(SequenceInner::new) }
    }

    /// Create an empty sequence with a given failure policy
    pub fn with_cancel_on_error(cancel_on_error: bool) -> Self {
        let sequence = Self::new();
        sequence.set_cancel_on_error(cancel_on_error);
        sequence
    }

    /// Whether a failed step aborts the whole sequence
    pub fn cancel_on_error(&self) -> bool {
        self.inner.cancel_on_error.get()
    }

    /// Choose whether a failed step aborts the whole sequence
    pub fn set_cancel_on_error(&self, cancel_on_error: bool) {
        self.inner.cancel_on_error.set(cancel_on_error);
    }

    /// Append a step running a closure, returns the index of the step
    pub fn add<F>(&self, call: F) -> usize
        where F: Fn() -> Option<AsyncOperation> + 'static
    {
        self.add_call(Rc::new(FnCall(call)))
    }

    /// Append a step, returns the index of the step
    pub fn add_call(&self, call: Rc<dyn AsyncCall>) -> usize {
        self.add_step(AsyncStep::from_call(call))
    }

    /// Append a step along with its observer, returns the index of the step
    pub fn add_step(&self, step: AsyncStep) -> usize {
        let mut steps = self.inner.steps.borrow_mut();
        steps.push(SequenceStep {
            call: step.call,
            operation: None,
            completion_handler: step.completion_handler,
        });
        steps.len() - 1
    }

    /// Run a closure once the most recently added step is over
    ///
    /// The closure runs whatever the outcome of the step, before the sequence
    /// decides what to do next.
    ///
    pub fn then<F>(&self, callback: F) -> Result<(), SequenceError>
        where F: Fn(&AsyncOperation) + 'static
    {
        self.then_handler(handler_fn(callback))
    }

    /// Notify a completion handler once the most recently added step is over
    pub fn then_handler(&self, handler: Rc<dyn CompletionHandler>) -> Result<(), SequenceError> {
        let mut steps = self.inner.steps.borrow_mut();
        let index = steps.len().checked_sub(1).ok_or(SequenceError::NoSteps)?;
        let step = &mut steps[index];
        if step.completion_handler.is_some() {
            return Err(SequenceError::HandlerAlreadySet { index });
        }
        step.completion_handler = Some(handler);
        Ok(())
    }

    /// Start running the steps
    ///
    /// If every step finishes synchronously, the sequence is over by the time
    /// this returns, and so is the returned promise.
    ///
    pub fn start(&self) -> Result<Promise, SequenceError> {
        let inner = &self.inner;
        inner.reap_abandoned();
        if inner.umbrella.borrow().is_some() {
            return Err(SequenceError::AlreadyStarted);
        }
        inner.current.set(None);
        inner.cancel_pending.set(false);

        // The umbrella operation keeps the sequence alive while it runs, and
        // hands cancellation requests over to it
        let umbrella = AsyncOperation::new();
        let target: Rc<dyn AsyncCancel> = inner.clone();
        umbrella.set_cancel_target(Some(Link::Strong(target)));
        *inner.umbrella.borrow_mut() = Some(umbrella.clone());
        umbrella.set_state(AsyncState::Started);
        debug!(steps = self.count(), "sequence started");

        inner.advance(None);
        Ok(Promise::new(umbrella))
    }

    /// Truth that the sequence is running
    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    /// Start the sequence unless it is already running
    ///
    /// Returns the new promise if the sequence was started.
    ///
    pub fn resume(&self) -> Option<Promise> {
        if self.is_started() {
            return None;
        }
        self.start().ok()
    }

    /// Cancel the step which is currently running, if any
    ///
    /// The sequence gets canceled once that step reports back. A request made
    /// while a step is being started (from within its call) is applied to the
    /// operation the call returns, or cancels the sequence if it returns none.
    ///
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Truth that the sequence has no steps
    pub fn is_empty(&self) -> bool {
        self.inner.steps.borrow().is_empty()
    }

    /// Number of steps
    pub fn count(&self) -> usize {
        self.inner.steps.borrow().len()
    }

    /// Index of the running step, if any
    pub fn current_index(&self) -> Option<usize> {
        self.inner.current.get()
    }

    /// Operation returned by a step which already started
    pub fn operation(&self, index: usize) -> Option<AsyncOperation> {
        self.inner.steps.borrow().get(index).and_then(|step| step.operation.clone())
    }

    /// Result of a step, empty if the step did not produce an operation
    pub fn result(&self, index: usize) -> AsyncValue {
        self.operation(index)
            .map(|operation| operation.result())
            .unwrap_or_default()
    }
}
//
impl Default for AsyncSequence {
    fn default() -> Self {
        Self::new()
    }
}


/// One entry of a sequence
struct SequenceStep {
    /// Starts the work
    call: Rc<dyn AsyncCall>,

    /// Tracks the work, once started
    operation: Option<AsyncOperation>,

    /// Observer which is told about the outcome of the step
    completion_handler: Option<Rc<dyn CompletionHandler>>,
}


/// Outcome of an attempt to launch the next step
enum Launch {
    /// A step is in flight, or the run was ended while starting it
    Waiting,

    /// The step's operation was over by the time we attached to it
    Finished(AsyncOperation),

    /// No step is left
    Exhausted,

    /// Cancellation was requested while a step was being started
    Canceled,
}


/// State shared by all handles to a sequence
struct SequenceInner {
    /// Self-reference, used to register as the steps' completion handler
    this: Weak<SequenceInner>,

    /// Steps, in execution order
    steps: RefCell<Vec<SequenceStep>>,

    /// Index of the running step
    current: Cell<Option<usize>>,

    /// Whether a failed step aborts the sequence
    cancel_on_error: Cell<bool>,

    /// Operation representing the whole sequence, while it runs
    umbrella: RefCell<Option<AsyncOperation>>,

    /// Set while attaching to a step's operation, which may notify us at once
    attaching: Cell<bool>,

    /// Step operation which notified us while we were attaching to it
    finished_early: RefCell<Option<AsyncOperation>>,

    /// Cancellation requested while the running step had no operation yet
    cancel_pending: Cell<bool>,
}
//
impl SequenceInner {
    fn new(this: &Weak<SequenceInner>) -> Self {
        SequenceInner {
            this: this.clone(),
            steps: RefCell::new(Vec::new()),
            current: Cell::new(None),
            cancel_on_error: Cell::new(false),
            umbrella: RefCell::new(None),
            attaching: Cell::new(false),
            finished_early: RefCell::new(None),
            cancel_pending: Cell::new(false),
        }
    }

    fn is_started(&self) -> bool {
        self.umbrella
            .borrow()
            .as_ref()
            .is_some_and(|umbrella| umbrella.state() == AsyncState::Started)
    }

    /// End a run whose umbrella operation was terminated by someone else
    ///
    /// Returns true if there was such a run.
    ///
    fn reap_abandoned(&self) -> bool {
        let state = match self.umbrella.borrow().as_ref() {
            Some(umbrella) if umbrella.is_final() => umbrella.state(),
            _ => return false,
        };
        debug!(%state, "umbrella operation was terminated from outside the sequence");
        self.finish(state, None);
        true
    }

    /// Launch and settle steps until one is in flight or the run is over
    ///
    /// `finished` is a step operation which just reached a terminal state.
    /// Steps which are over as soon as they are launched are settled by this
    /// loop, so that long runs of them do not pile up on the stack.
    ///
    fn advance(&self, finished: Option<AsyncOperation>) {
        let mut finished = finished;
        let mut last: Option<(AsyncState, AsyncOperation)> = None;
        loop {
            if let Some(operation) = finished.take() {
                let Some(state) = self.settle(&operation) else {
                    return;
                };
                last = Some((state, operation));
            }

            match self.launch_next() {
                Launch::Waiting => return,
                Launch::Finished(operation) => finished = Some(operation),
                Launch::Canceled => {
                    self.finish(AsyncState::Canceled, None);
                    return;
                }
                Launch::Exhausted => {
                    match last {
                        Some((AsyncState::Failed, _)) => self.finish(AsyncState::Failed, None),
                        Some((_, operation)) => {
                            self.finish(AsyncState::Completed, Some(operation.result()))
                        }
                        None => self.finish(AsyncState::Completed, None),
                    }
                    return;
                }
            }
        }
    }

    /// Notify the observer of a finished step, then decide what comes next
    ///
    /// Returns the step's state if the sequence should move on to the next
    /// step, or `None` if this run is over or was taken elsewhere.
    ///
    fn settle(&self, operation: &AsyncOperation) -> Option<AsyncState> {
        let (index, handler) = self.current_step_handler(operation)?;
        let state = operation.state();
        trace!(step = index, %state, "sequence step finished");

        // Observers come first, and may add further steps
        if let Some(handler) = handler {
            handler.on_completion(operation);
            if !self.is_started() {
                self.reap_abandoned();
                return None;
            }
            if self.current.get() != Some(index) {
                return None;
            }
        }

        match state {
            AsyncState::Completed => Some(state),
            AsyncState::Failed if !self.cancel_on_error.get() => Some(state),
            AsyncState::Failed | AsyncState::Canceled => {
                self.finish(state, None);
                None
            }
            AsyncState::None | AsyncState::Started => None,
        }
    }

    /// Start steps until one of them produces an operation
    fn launch_next(&self) -> Launch {
        loop {
            let index = self.current.get().map_or(0, |current| current + 1);
            let call = match self.steps.borrow().get(index) {
                Some(step) => step.call.clone(),
                None => return Launch::Exhausted,
            };
            self.current.set(Some(index));
            debug!(step = index, "starting sequence step");

            let launched = call.call();
            if !self.is_started() {
                self.reap_abandoned();
                return Launch::Waiting;
            }
            let Some(operation) = launched else {
                trace!(step = index, "sequence step finished synchronously");
                if self.cancel_pending.take() {
                    return Launch::Canceled;
                }
                continue;
            };
            if let Some(step) = self.steps.borrow_mut().get_mut(index) {
                step.operation = Some(operation.clone());
            }
            if self.cancel_pending.take() {
                debug!(step = index, "forwarding cancellation requested while the step started");
                operation.cancel();
            }

            // An operation which is already over notifies us right away
            self.attaching.set(true);
            let this: Weak<dyn CompletionHandler> = self.this.clone();
            operation.set_weak_completion_handler(this);
            self.attaching.set(false);

            let finished = self.finished_early.borrow_mut().take();
            return match finished {
                Some(operation) => Launch::Finished(operation),
                None => Launch::Waiting,
            };
        }
    }

    /// Terminate the umbrella operation and forget about the steps
    fn finish(&self, outcome: AsyncState, result: Option<AsyncValue>) {
        // Hand the umbrella operation over to a local before touching its
        // state: its handler may restart the sequence
        let umbrella = self.umbrella.borrow_mut().take();
        self.current.set(None);
        self.cancel_pending.set(false);
        let steps = std::mem::take(&mut *self.steps.borrow_mut());
        debug!(%outcome, steps = steps.len(), "sequence finished");

        if let Some(umbrella) = &umbrella {
            umbrella.set_cancel_target(None);
            if let Some(result) = result {
                umbrella.set_result(result);
            }
            if umbrella.state() == AsyncState::Started {
                umbrella.set_state(outcome);
            }
        }
        drop(steps);
        drop(umbrella);
    }

    /// Find the observer of the running step, if it owns a given operation
    fn current_step_handler(&self, operation: &AsyncOperation)
        -> Option<(usize, Option<Rc<dyn CompletionHandler>>)>
    {
        let index = self.current.get()?;
        let steps = self.steps.borrow();
        let step = steps.get(index)?;
        let owned = step.operation
                        .as_ref()
                        .is_some_and(|candidate| candidate.ptr_eq(operation));
        owned.then(|| (index, step.completion_handler.clone()))
    }
}
//
impl CompletionHandler for SequenceInner {
    fn on_completion(&self, operation: &AsyncOperation) {
        if self.reap_abandoned() {
            return;
        }
        if !self.is_started() {
            debug!("ignoring step completion while the sequence is not running");
            return;
        }
        if self.current_step_handler(operation).is_none() {
            debug!("ignoring completion of an operation which is not the running step");
            return;
        }

        // Settled by the launching loop once the attachment is done
        if self.attaching.get() {
            *self.finished_early.borrow_mut() = Some(operation.clone());
            return;
        }
        self.advance(Some(operation.clone()));
    }

    fn as_operation(&self) -> Option<AsyncOperation> {
        self.umbrella.borrow().clone()
    }
}
//
impl AsyncCancel for SequenceInner {
    fn cancel(&self) {
        if !self.is_started() {
            return;
        }
        let Some(index) = self.current.get() else {
            return;
        };
        let running = self.steps.borrow().get(index).and_then(|step| step.operation.clone());
        match running {
            Some(operation) => {
                debug!(step = index, "canceling running sequence step");
                operation.cancel();
            }
            None => {
                debug!(step = index, "sequence step is starting, cancellation deferred");
                self.cancel_pending.set(true);
            }
        }
    }
}
