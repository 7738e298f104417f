//! The bundled thread-backed [`Pool`]: a fixed fleet of worker threads pulling jobs off one
//! bounded channel, so concurrency is capped by thread count rather than by any counter that
//! could drift out of sync with reality.
//!
//! The one thing a thread pool genuinely cannot do is force-stop a thread that's already
//! running: there is no safe, portable way to do that for a plain OS thread. `release` is
//! honest about this: it hands the task's fate to whichever of {the worker finishing
//! naturally, the supervisor releasing it} gets there first via a single atomic
//! compare-and-swap, and if the supervisor wins, a replacement worker thread is spawned so the
//! pool's usable capacity doesn't shrink even though the orphaned thread keeps running in the
//! background until its job eventually returns (at which point its result is silently dropped).

use super::{Pool, PoolTask};
use crate::atomic::{Atomic, AtomicBool};
use crate::channel;
use crate::error::HandlerFailure;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

type Outcome = Result<(), HandlerFailure>;
type DoneCallback = Box<dyn FnOnce(Outcome) + Send>;

#[derive(Default)]
struct Inner {
    outcome: Option<Outcome>,
    callback: Option<DoneCallback>,
}

struct TaskState {
    running: AtomicBool,
    finalized: AtomicBool,
    submitted_at: Instant,
    inner: Mutex<Inner>,
}

impl TaskState {
    fn new() -> Self {
        Self {
            running: AtomicBool::from(true),
            finalized: AtomicBool::from(false),
            submitted_at: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The worker thread claims the task's fate after running the job. Returns `false` if the
    /// supervisor already released this task, in which case `outcome` is dropped unused.
    fn finalize_by_worker(&self, outcome: Outcome) -> bool {
        if !self.finalized.compare_and_set(false, true) {
            return false;
        }
        self.running.set(false);
        let mut inner = self.inner.lock();
        if let Some(callback) = inner.callback.take() {
            drop(inner);
            callback(outcome);
        } else {
            inner.outcome = Some(outcome);
        }
        true
    }

    /// The supervisor claims the task's fate before the worker got there. Returns `false` if
    /// the job had already finished naturally.
    fn finalize_by_release(&self) -> bool {
        if !self.finalized.compare_and_set(false, true) {
            return false;
        }
        self.running.set(false);
        true
    }

    fn add_done_callback(&self, callback: DoneCallback) {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.outcome.take() {
            drop(inner);
            callback(outcome);
        } else {
            inner.callback = Some(callback);
        }
    }
}

/// A handle to a job scheduled on [`ThreadPool`]. Cheap to clone: it's just an `Arc`.
#[derive(Clone)]
pub struct ThreadTask {
    state: Arc<TaskState>,
}

impl PoolTask for ThreadTask {
    fn running(&self) -> bool {
        self.state.running.get()
    }

    fn submitted_at(&self) -> Instant {
        self.state.submitted_at
    }

    fn add_done_callback(&self, callback: DoneCallback) {
        self.state.add_done_callback(callback);
    }
}

struct Job {
    state: Arc<TaskState>,
    work: Box<dyn FnOnce() -> Outcome + Send>,
}

/// The bundled, thread-backed [`Pool`] implementation. Used by [`crate::ConsumerBuilder`]
/// whenever `with_thread_executor` is left at its default of `true`.
pub struct ThreadPool {
    sender: channel::Sender<Job>,
    receiver: channel::Receiver<Job>,
    max_handlers: usize,
    thread_seq: Arc<AtomicU64>,
    initializer: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ThreadPool {
    /// Builds a pool with `max_handlers` worker threads and no per-thread initializer.
    pub fn new(max_handlers: usize) -> Self {
        Self::with_initializer(max_handlers, None)
    }

    /// Builds a pool with `max_handlers` worker threads, each running `initializer` once before
    /// pulling its first job.
    pub fn with_initializer(max_handlers: usize, initializer: Option<Arc<dyn Fn() + Send + Sync>>) -> Self {
        let max_handlers = max_handlers.max(1);
        let (sender, receiver) = channel::bounded(max_handlers);
        let thread_seq = Arc::new(AtomicU64::new(0));
        let pool = Self {
            sender,
            receiver,
            max_handlers,
            thread_seq,
            initializer,
        };
        for _ in 0..max_handlers {
            pool.spawn_worker();
        }
        pool
    }

    fn spawn_worker(&self) {
        let receiver = self.receiver.clone();
        let initializer = self.initializer.clone();
        let id = self.thread_seq.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("apiary-pool-{id}"))
            .spawn(move || worker_loop(receiver, initializer));
        // A thread that fails to spawn (process out of resources) leaves the pool one worker
        // short; there is nothing more graceful to do here than let the caller observe reduced
        // throughput, so the error is intentionally discarded rather than panicking the caller.
        let _ = spawned;
    }
}

fn worker_loop(receiver: channel::Receiver<Job>, initializer: Option<Arc<dyn Fn() + Send + Sync>>) {
    if let Some(init) = initializer {
        init();
    }
    while let Ok(Job { state, work }) = receiver.recv() {
        let outcome = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => result,
            Err(payload) => Err(HandlerFailure::from_panic(payload)),
        };
        state.finalize_by_worker(outcome);
    }
}

impl Pool for ThreadPool {
    type Task = ThreadTask;

    fn schedule<F>(&self, job: F) -> ThreadTask
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let state = Arc::new(TaskState::new());
        let task = ThreadTask { state: Arc::clone(&state) };
        let envelope = Job { state, work: Box::new(job) };
        // Blocks when all `max_handlers` workers are busy and the channel is full: this is the
        // backpressure the `Pool` contract calls for.
        let _ = self.sender.send(envelope);
        task
    }

    fn release(&self, task: &ThreadTask) -> bool {
        if task.state.finalize_by_release() {
            self.spawn_worker();
            true
        } else {
            false
        }
    }

    fn max_handlers(&self) -> usize {
        self.max_handlers
    }
}
