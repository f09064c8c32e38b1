//! Polling-based progress monitoring
//!
//! Operations live on the thread that drives them, but the progress of the
//! work behind them is often displayed elsewhere, e.g. by a UI thread that
//! refreshes a progress bar every now and then. This module connects the two
//! through a triple buffer: the worker thread publishes progress reports
//! without ever blocking, and the monitor reads the latest one whenever it
//! feels like it, skipping over the reports it was too slow to see.
//!
//! The monitor can also ask for the work to stop. The request is picked up by
//! `AsyncOpServer::cancel_requested()` on the worker side.

use crate::client::AsyncCancel;
use crate::handler::{Progress, ProgressSink};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use triple_buffer::{Input, Output, TripleBuffer};


/// Build a connected progress sink and progress monitor
///
/// The sink is meant to be attached to an operation with
/// `AsyncOperation::set_progress_handler()`, whereas the monitor can be sent
/// to another thread.
///
pub fn progress_channel() -> (PollingProgressSink, ProgressMonitor) {
    let (input, output) = TripleBuffer::new(&Progress::default()).split();
    let stop = Arc::new(AtomicBool::new(false));
    let sink = PollingProgressSink {
        input: RefCell::new(input),
        stop: stop.clone(),
    };
    let monitor = ProgressMonitor { output, stop };
    (sink, monitor)
}


/// Progress sink which publishes progress reports through a triple buffer
pub struct PollingProgressSink {
    /// New progress reports are sent through this triple buffer
    input: RefCell<Input<Progress>>,

    /// Set when the monitor asks for the work to stop
    stop: Arc<AtomicBool>,
}
//
impl ProgressSink for PollingProgressSink {
    fn update_progress(&self, progress: Progress) {
        self.input.borrow_mut().write(progress);
    }

    fn is_canceled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}


/// Monitor interface, used to poll the latest progress report
pub struct ProgressMonitor {
    /// Latest progress report will be read through this triple buffer
    output: Output<Progress>,

    /// Raised to ask for the work to stop
    stop: Arc<AtomicBool>,
}
//
impl ProgressMonitor {
    /// Access the latest progress report
    pub fn progress(&mut self) -> &Progress {
        self.output.read()
    }

    /// Truth that a new progress report came in since the last read
    pub fn has_update(&self) -> bool {
        self.output.updated()
    }

    /// Truth that this monitor asked for the work to stop
    pub fn is_canceled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
//
impl AsyncCancel for ProgressMonitor {
    fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::AsyncOperation;
    use crate::server::AsyncOpServer;
    use crate::status::AsyncState;
    use std::rc::Rc;
    use std::thread;

    /// Check the initial state of the channel
    #[test]
    fn initial_state() {
        let (sink, mut monitor) = progress_channel();
        assert_eq!(*monitor.progress(), Progress::default());
        assert!(!monitor.has_update());
        assert!(!sink.is_canceled());
    }

    /// Check that progress reports propagate from sink to monitor
    #[test]
    fn progress_propagation() {
        let (sink, mut monitor) = progress_channel();
        sink.update_progress(Progress::new(0.25));
        sink.update_progress(Progress::new(0.5).with_text("halfway"));
        assert!(monitor.has_update());
        assert_eq!(monitor.progress().fraction, 0.5);
        assert_eq!(monitor.progress().text.as_deref(), Some("halfway"));
        assert!(!monitor.has_update());
    }

    /// Monitors may ask the worker to stop
    #[test]
    fn cancellation_request() {
        let (sink, monitor) = progress_channel();
        let (server, operation) = AsyncOpServer::new_operation();
        operation.set_progress_handler(Some(Rc::new(sink)));
        assert!(!server.cancel_requested());

        monitor.cancel();
        assert!(monitor.is_canceled());
        assert!(server.cancel_requested());
        server.cancel();
        assert_eq!(operation.state(), AsyncState::Canceled);
    }

    /// Monitors can live on another thread
    #[test]
    fn remote_monitor() {
        let (sink, mut monitor) = progress_channel();
        let operation = AsyncOperation::new();
        operation.set_progress_handler(Some(Rc::new(sink)));
        let server = AsyncOpServer::start(operation.clone());

        let watcher = thread::spawn(move || {
            while monitor.progress().fraction < 1.0 {
                thread::yield_now();
            }
            monitor.cancel();
            monitor.progress().clone()
        });

        for step in 1..=4 {
            server.report_progress(Progress::new(step as f32 / 4.0));
        }
        let last = watcher.join().unwrap();
        assert_eq!(last.fraction, 1.0);
        assert!(server.cancel_requested());
        server.complete(Default::default());
        assert_eq!(operation.state(), AsyncState::Completed);
    }
}
