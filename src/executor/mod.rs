//! Deferred callback execution
//!
//! Whenever an asynchronous operation changes state, one important design
//! issue is to decide when the resulting callbacks should be executed.
//!
//! The default answer of this crate is to run completion handlers inline, as
//! part of the state transition. This has minimal overhead and makes the order
//! of events easy to reason about. But it is not always what callers want:
//!
//! - A freshly created operation which is already complete would notify its
//!   handler before the caller had any chance to attach one
//! - An object which gets destroyed while it is dispatching a notification
//!   about itself would pull the rug from under its own feet
//!
//! For these cases, work can be deferred to an event queue which runs on the
//! same thread, at a later point in time. There is no second thread of control
//! here: "later" simply means "once the current call stack has unwound and
//! somebody flushes the queue".
//!
//! Each thread has its own queue, accessible through the free functions of
//! this module. Standalone queues can also be created for finer control.

pub mod queue;

pub use self::queue::{EventQueue, Task};

use std::rc::Rc;
use std::time::Duration;


thread_local! {
    static CURRENT: Rc<EventQueue> = Rc::new(EventQueue::new());
}


/// Access the event queue of the current thread
pub fn current() -> Rc<EventQueue> {
    CURRENT.with(|queue| queue.clone())
}

/// Schedule a task on the current thread's event queue
pub fn post<F: FnOnce() + 'static>(task: F) {
    current().post(task);
}

/// Schedule a task on the current thread's event queue, after some delay
pub fn post_delayed<F: FnOnce() + 'static>(delay: Duration, task: F) {
    current().post_delayed(delay, task);
}

/// Destroy a value from the current thread's event queue
pub fn defer_drop<T: 'static>(value: T) {
    current().defer_drop(value);
}

/// Run the tasks of the current thread's queue which are due right now
pub fn flush() -> usize {
    current().flush()
}

/// Flush the current thread's queue until no task is due anymore
pub fn run_until_idle() -> usize {
    current().run_until_idle()
}

/// Run the current thread's queue until it is empty, sleeping as needed
pub fn run() -> usize {
    current().run()
}
