//! Worker side of an asynchronous operation
//!
//! Whoever performs the work behind an asynchronous operation holds an
//! `AsyncOpServer`. It is the only piece of code that is expected to drive the
//! operation to a terminal state, and it makes sure that this always happens:
//! a server which goes away before the work is finished fails the operation,
//! so that no client ends up waiting forever on a worker that is gone.

use crate::handler::Progress;
use crate::operation::AsyncOperation;
use crate::status::AsyncState;
use crate::value::AsyncValue;
use tracing::{debug, warn};


/// Server interface, used to submit asynchronous operation updates
pub struct AsyncOpServer {
    /// Operation which we are responsible for
    operation: AsyncOperation,
}
//
impl AsyncOpServer {
    /// Take charge of an operation, and mark it as started
    pub fn start(operation: AsyncOperation) -> Self {
        operation.set_state(AsyncState::Started);
        AsyncOpServer { operation }
    }

    /// Create a fresh started operation, along with its server
    pub fn new_operation() -> (Self, AsyncOperation) {
        let operation = AsyncOperation::new();
        (Self::start(operation.clone()), operation)
    }

    /// Operation which this server drives
    pub fn operation(&self) -> &AsyncOperation {
        &self.operation
    }

    /// Truth that the client does not want the work to go on
    ///
    /// This is the case if the operation was canceled, or if whoever watches
    /// its progress asked for cancellation.
    ///
    pub fn cancel_requested(&self) -> bool {
        self.operation.state() == AsyncState::Canceled
            || self.operation
                   .progress_handler()
                   .is_some_and(|sink| sink.is_canceled())
    }

    /// Forward a progress report to whoever is interested in it
    pub fn report_progress(&self, progress: Progress) {
        if let Some(sink) = self.operation.progress_handler() {
            sink.update_progress(progress);
        }
    }

    /// Publish the result of the work
    pub fn complete(self, value: AsyncValue) {
        if self.finished_early() {
            return;
        }
        self.operation.set_result(value);
        self.operation.set_state(AsyncState::Completed);
    }

    /// Report that the work could not be carried out
    pub fn fail(self) {
        if !self.finished_early() {
            self.operation.set_state(AsyncState::Failed);
        }
    }

    /// Acknowledge a cancellation request
    pub fn cancel(self) {
        if !self.finished_early() {
            self.operation.set_state(AsyncState::Canceled);
        }
    }

    /// Check if the operation was terminated behind our back (e.g. canceled)
    fn finished_early(&self) -> bool {
        let state = self.operation.state();
        if state.is_final() {
            debug!(%state, "dropping update for an operation which already finished");
        }
        state.is_final()
    }
}
//
impl Drop for AsyncOpServer {
    /// If the server is killed before the operation has reached a terminal
    /// state, notify the client in order to prevent it from hanging
    fn drop(&mut self) {
        if !self.operation.is_final() {
            warn!("asynchronous operation server dropped before completion");
            self.operation.set_state(AsyncState::Failed);
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, ProgressSink};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Starting a server starts the operation
    #[test]
    fn start() {
        let (server, operation) = AsyncOpServer::new_operation();
        assert_eq!(operation.state(), AsyncState::Started);
        assert!(server.operation().ptr_eq(&operation));
        assert!(!server.cancel_requested());
        server.complete(AsyncValue::new(String::from("done")));
        assert_eq!(operation.state(), AsyncState::Completed);
        assert_eq!(operation.result().get::<String>().map(String::as_str), Some("done"));
    }

    /// Killing the server fails the operation
    #[test]
    fn server_killed() {
        let (server, operation) = AsyncOpServer::new_operation();
        let called = Rc::new(Cell::new(false));
        let c_called = called.clone();
        operation.set_completion_handler(handler_fn(move |op: &AsyncOperation| {
            assert_eq!(op.state(), AsyncState::Failed);
            c_called.set(true);
        }));
        drop(server);
        assert!(called.get());
    }

    /// Canceled operations ignore late results
    #[test]
    fn late_result_after_cancel() {
        let (server, operation) = AsyncOpServer::new_operation();
        operation.cancel();
        assert!(server.cancel_requested());
        server.complete(AsyncValue::new(3u8));
        assert_eq!(operation.state(), AsyncState::Canceled);
        assert!(operation.result().is_empty());
    }

    /// Explicit failure and cancellation
    #[test]
    fn fail_and_cancel() {
        let (server, operation) = AsyncOpServer::new_operation();
        server.fail();
        assert_eq!(operation.state(), AsyncState::Failed);

        let (server, operation) = AsyncOpServer::new_operation();
        server.cancel();
        assert_eq!(operation.state(), AsyncState::Canceled);
    }

    /// Progress reports reach the sink, which can ask for cancellation
    #[test]
    fn progress() {
        #[derive(Default)]
        struct Sink {
            last: RefCell<Option<Progress>>,
            stop: Cell<bool>,
        }
        impl ProgressSink for Sink {
            fn update_progress(&self, progress: Progress) {
                *self.last.borrow_mut() = Some(progress);
            }
            fn is_canceled(&self) -> bool {
                self.stop.get()
            }
        }

        let (server, operation) = AsyncOpServer::new_operation();
        let sink = Rc::new(Sink::default());
        operation.set_progress_handler(Some(sink.clone()));
        server.report_progress(Progress::new(0.75));
        assert_eq!(sink.last.borrow().as_ref().map(|p| p.fraction), Some(0.75));

        assert!(!server.cancel_requested());
        sink.stop.set(true);
        assert!(server.cancel_requested());
        server.cancel();
    }
}
