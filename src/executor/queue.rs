//! Single-threaded event queue
//!
//! Tasks are one-shot closures. Each task owns whatever it captured, so an
//! object referenced by a pending task is guaranteed to stay alive until the
//! task has run (or the queue has been dropped).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};


/// A unit of deferred work
pub type Task = Box<dyn FnOnce()>;


/// Queue of deferred tasks, all run on the thread which owns the queue
#[derive(Default)]
pub struct EventQueue {
    /// Tasks which may run as soon as the queue is flushed
    ready: RefCell<VecDeque<Task>>,

    /// Tasks which must not run before some deadline
    delayed: RefCell<Vec<DelayedTask>>,

    /// Tie-breaker which keeps delayed tasks with equal deadlines in order
    next_sequence: Cell<u64>,
}
//
impl EventQueue {
    /// Create an empty event queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task to run on the next flush
    pub fn post<F: FnOnce() + 'static>(&self, task: F) {
        self.ready.borrow_mut().push_back(Box::new(task));
    }

    /// Schedule a task to run on the first flush after some delay elapsed
    pub fn post_delayed<F: FnOnce() + 'static>(&self, delay: Duration, task: F) {
        if delay.is_zero() {
            return self.post(task);
        }
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        self.delayed.borrow_mut().push(DelayedTask {
            deadline: Instant::now() + delay,
            sequence,
            task: Box::new(task),
        });
    }

    /// Destroy a value from the event queue instead of the current stack frame
    pub fn defer_drop<T: 'static>(&self, value: T) {
        self.post(move || drop(value));
    }

    /// Number of tasks which have not run yet, delayed ones included
    pub fn pending(&self) -> usize {
        self.ready.borrow().len() + self.delayed.borrow().len()
    }

    /// Truth that no task is waiting, delayed ones included
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Time left until the next task becomes runnable, if there is one
    pub fn time_to_next(&self) -> Option<Duration> {
        if !self.ready.borrow().is_empty() {
            return Some(Duration::ZERO);
        }
        let now = Instant::now();
        self.delayed
            .borrow()
            .iter()
            .map(|delayed| delayed.deadline.saturating_duration_since(now))
            .min()
    }

    /// Run every task which is due at the time of the call
    ///
    /// Tasks posted by the tasks being run are left for the next flush.
    /// Returns the number of tasks that were run.
    ///
    pub fn flush(&self) -> usize {
        // Collect due tasks first, so that running them may post new ones
        let mut batch: Vec<Task> = self.ready.borrow_mut().drain(..).collect();
        batch.extend(self.take_due(Instant::now()));

        // ...then run them in order
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Flush repeatedly until no task is due anymore
    ///
    /// Delayed tasks whose deadline has not been reached are left alone.
    ///
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let count = self.flush();
            if count == 0 {
                return total;
            }
            total += count;
        }
    }

    /// Run tasks, sleeping whenever needed, until the queue is empty
    pub fn run(&self) -> usize {
        let mut total = self.run_until_idle();
        while let Some(wait) = self.time_to_next() {
            std::thread::sleep(wait);
            total += self.run_until_idle();
        }
        total
    }

    /// Extract the delayed tasks whose deadline has passed, in deadline order
    fn take_due(&self, now: Instant) -> Vec<Task> {
        let mut delayed = self.delayed.borrow_mut();
        let (mut due, waiting): (Vec<DelayedTask>, Vec<DelayedTask>) =
            delayed.drain(..).partition(|task| task.deadline <= now);
        *delayed = waiting;
        due.sort_by_key(|task| (task.deadline, task.sequence));
        due.into_iter().map(|task| task.task).collect()
    }
}


/// Task which must not run before a deadline
struct DelayedTask {
    deadline: Instant,
    sequence: u64,
    task: Task,
}
