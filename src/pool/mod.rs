//! The bounded execution pool contract, and the bundled thread-backed implementation.
//!
//! [`Pool`] is the seam between this crate and however jobs actually get executed: callers are
//! always free to implement `Pool` themselves, and everything in `crate::fetcher` and
//! `crate::supervisor` is generic over it.

mod thread;

pub use thread::ThreadPool;

use crate::error::HandlerFailure;
use std::time::Instant;

/// A handle to one scheduled job. Implementations are expected to be cheap to `Clone` (an
/// `Arc`-backed handle, in practice), since the registry and the supervisor each keep their
/// own clone alongside the fetcher's own.
pub trait PoolTask: Clone + Send + Sync + 'static {
    /// `true` until the job has either finished naturally or been force-released.
    fn running(&self) -> bool;

    /// When this task was submitted, for the supervisor's stuck-time comparison.
    fn submitted_at(&self) -> Instant;

    /// Registers a callback to run exactly once, with the job's outcome, either immediately (if
    /// the job has already finished by the time this is called) or whenever it does finish. A
    /// task that is force-released via [`Pool::release`] never invokes its callback: a
    /// released task's fate is "stuck", not "succeeded" or "failed".
    fn add_done_callback(&self, callback: Box<dyn FnOnce(Result<(), HandlerFailure>) + Send>);
}

/// A bounded handler-execution pool: at most `max_handlers` jobs run concurrently.
pub trait Pool: Send + Sync + 'static {
    type Task: PoolTask;

    /// Submits `job` for execution, blocking (applying backpressure) rather than exceeding
    /// `max_handlers` concurrent jobs.
    fn schedule<F>(&self, job: F) -> Self::Task
    where
        F: FnOnce() -> Result<(), HandlerFailure> + Send + 'static;

    /// Best-effort forced release of a still-running task. Returns `true` only if this call is
    /// the one that froze the task's fate as "released" (i.e. it hadn't already finished
    /// naturally); that's the signal the supervisor uses to count it as stuck rather than
    /// retrying the release next tick.
    fn release(&self, task: &Self::Task) -> bool;

    /// The concurrency cap this pool was built with.
    fn max_handlers(&self) -> usize;
}
