//! Sequenced asynchronous operations
//!
//! Picture yourself in a situation where: you want to perform a series of
//! things which each take some time, such as asking a user to sign in, then
//! downloading a list of items page by page, then storing it somewhere. Each
//! of these things completes later on, through some callback. You would like
//! to chain them, stop at the first cancellation, decide whether a failure
//! should stop everything, and let whoever waits on the whole thing know how
//! far along it is.
//!
//! This crate provides the building blocks for this:
//!
//! - An `AsyncOperation` is a shared handle to the state and result of some
//!   work. It notifies a completion handler when the work is over.
//! - An `AsyncOpServer` is held by whoever performs the work, and guarantees
//!   that the operation reaches a terminal state eventually.
//! - A `Promise` attaches continuations to an operation, producing chains
//!   that can be cancelled and monitored from their far end.
//! - An `AsyncSequence` runs a list of steps one after the other, and is
//!   itself observed through a single umbrella operation.
//!
//! Everything runs on a single thread. Deferred work goes through the event
//! queue of the `executor` module, and the `multithread` module lets other
//! threads keep an eye on the progress of the work.

pub mod client;
pub mod error;
pub mod executor;
pub mod handler;
pub mod multithread;
pub mod operation;
pub mod promise;
pub mod sequence;
pub mod server;
pub mod status;
pub mod value;

pub use crate::client::AsyncCancel;
pub use crate::error::SequenceError;
pub use crate::handler::{handler_fn, CompletionHandler, Progress, ProgressSink};
pub use crate::operation::AsyncOperation;
pub use crate::promise::Promise;
pub use crate::sequence::{AsyncCall, AsyncSequence, AsyncStep};
pub use crate::server::AsyncOpServer;
pub use crate::status::AsyncState;
pub use crate::value::AsyncValue;
