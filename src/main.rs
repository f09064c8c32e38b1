//! Sequenced asynchronous operations demo
//!
//! Runs a sequence of simulated jobs on the event queue of the main thread,
//! while another thread polls their progress and prints it.

use clap::Parser;
use sequenced_async_ops::multithread::polling::{progress_channel, ProgressMonitor};
use sequenced_async_ops::{executor, AsyncCall, AsyncOpServer, AsyncOperation, AsyncSequence,
                          AsyncState, AsyncStep, AsyncValue, Progress, SequenceError};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;


/// Number of progress reports emitted by each job
const TICKS: u32 = 4;


#[derive(Parser, Debug)]
#[command(name = "sequence-demo")]
#[command(about = "Run a sequence of simulated asynchronous jobs", version)]
struct Cli {
    /// Number of jobs in the sequence
    #[arg(long, default_value_t = 4)]
    steps: usize,

    /// Index of a job which fails
    #[arg(long)]
    fail_at: Option<usize>,

    /// Index of a job during which the sequence gets canceled
    #[arg(long)]
    cancel_at: Option<usize>,

    /// Abort the sequence as soon as a job fails
    #[arg(long)]
    cancel_on_error: bool,

    /// Time between two progress reports of a job, in milliseconds
    #[arg(long, default_value_t = 25)]
    tick_ms: u64,

    /// Finish jobs as soon as they are started
    #[arg(long)]
    sync: bool,
}


/// Simulated job, which reports progress a few times before finishing
struct Job {
    index: usize,
    fails: bool,
    sync: bool,
    tick: Duration,

    /// Sequence to cancel once the job is underway, if any
    cancels: Option<AsyncSequence>,
}
//
impl AsyncCall for Job {
    fn call(&self) -> Option<AsyncOperation> {
        info!(job = self.index, "starting job");
        if self.sync {
            let operation = if self.fails {
                AsyncOperation::failed(false)
            } else {
                AsyncOperation::completed(AsyncValue::new(self.index), false)
            };
            return Some(operation);
        }

        let (server, operation) = AsyncOpServer::new_operation();
        let run = JobRun {
            server,
            index: self.index,
            fails: self.fails,
            tick: self.tick,
            cancels: self.cancels.clone(),
        };
        executor::post_delayed(self.tick, move || run.advance(1));
        Some(operation)
    }
}


/// Job in progress
struct JobRun {
    server: AsyncOpServer,
    index: usize,
    fails: bool,
    tick: Duration,
    cancels: Option<AsyncSequence>,
}
//
impl JobRun {
    fn advance(self, tick: u32) {
        if self.server.cancel_requested() {
            info!(job = self.index, "job canceled");
            self.server.cancel();
            return;
        }

        let fraction = tick as f32 / TICKS as f32;
        self.server.report_progress(Progress::new(fraction)
                                        .with_text(format!("job {}", self.index)));
        if tick == 1 {
            if let Some(sequence) = &self.cancels {
                warn!(job = self.index, "canceling the sequence");
                sequence.cancel();
            }
        }

        if tick < TICKS {
            let delay = self.tick;
            executor::post_delayed(delay, move || self.advance(tick + 1));
        } else if self.fails {
            warn!(job = self.index, "job failed");
            self.server.fail();
        } else {
            self.server.complete(AsyncValue::new(self.index));
        }
    }
}


/// Print progress reports until told to stop
fn watch(mut monitor: ProgressMonitor, done: Arc<AtomicBool>) {
    while !done.load(Ordering::Acquire) {
        if monitor.has_update() {
            let progress = monitor.progress();
            println!("[{:>3.0}%] {}",
                     progress.fraction * 100.0,
                     progress.text.as_deref().unwrap_or_default());
        }
        thread::sleep(Duration::from_millis(5));
    }
}


/// Build and run the sequence, returns its final state
fn run(cli: &Cli) -> Result<(AsyncState, AsyncValue), SequenceError> {
    let sequence = AsyncSequence::with_cancel_on_error(cli.cancel_on_error);
    for index in 0..cli.steps {
        let job = Rc::new(Job {
            index,
            fails: cli.fail_at == Some(index),
            sync: cli.sync,
            tick: Duration::from_millis(cli.tick_ms),
            cancels: (cli.cancel_at == Some(index)).then(|| sequence.clone()),
        });
        sequence.add_step(AsyncStep::from_call(job).on_completion(move |op| {
            info!(job = index, state = %op.state(), "job over")
        }));
    }

    let (sink, monitor) = progress_channel();
    let done = Arc::new(AtomicBool::new(false));
    let c_done = done.clone();
    let watcher = thread::spawn(move || watch(monitor, c_done));

    let promise = sequence.start()?
                          .then(|op| info!(state = %op.state(), "sequence over"));
    promise.set_progress_handler(Some(Rc::new(sink)));
    executor::run();

    done.store(true, Ordering::Release);
    if watcher.join().is_err() {
        warn!("progress watcher panicked");
    }
    Ok((promise.state(), promise.result()))
}


fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok((AsyncState::Completed, result)) => {
            match result.get::<usize>() {
                Some(index) => println!("sequence completed, last job was #{index}"),
                None => println!("sequence completed"),
            }
            ExitCode::SUCCESS
        }
        Ok((state, _)) => {
            println!("sequence {state}");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
