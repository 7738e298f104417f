//! The periodic health loop: revives fetcher threads that panicked, force-releases handler
//! tasks that have been running longer than `stuck_time`, and enforces a ceiling on how many
//! stuck handlers are tolerated before giving up.

use crate::error::{SuperviseError, SuperviseOptions};
use crate::event::OneShotEvent;
use crate::fetcher::{self, FetcherSpec};
use crate::handler::Handler;
use crate::pool::{Pool, PoolTask};
use crate::queue::Queue;
use crate::registry::{Registry, RegistryKey};
use crate::support::{Counter, Support};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// The outcome of [`crate::consumer::Consumer::supervise`]: either the loop already ran to
/// completion on the calling thread, or it was handed off to a detached daemon thread whose
/// `JoinHandle` the caller is responsible for inspecting.
pub enum Supervision {
    Blocking(Result<(), SuperviseError>),
    Detached(JoinHandle<Result<(), SuperviseError>>),
}

struct FetcherHandle<Q: Queue, H: Handler<Q::Message>, P: Pool> {
    spec: FetcherSpec<Q, H, P>,
    join: JoinHandle<()>,
}

fn spawn_fetcher<Q, H, P>(spec: FetcherSpec<Q, H, P>) -> FetcherHandle<Q, H, P>
where
    Q: Queue,
    H: Handler<Q::Message>,
    P: Pool,
{
    let running = spec.clone();
    let join = thread::Builder::new()
        .name("apiary-fetcher".to_string())
        .spawn(move || fetcher::run(running))
        .expect("failed to spawn fetcher thread");
    FetcherHandle { spec, join }
}

pub(crate) struct Supervisor<Q: Queue, H: Handler<Q::Message>, P: Pool> {
    fetchers: Mutex<Vec<FetcherHandle<Q, H, P>>>,
    registry: Arc<Registry<P::Task>>,
    stuck: Mutex<HashSet<RegistryKey>>,
    shutdown: Arc<AtomicBool>,
    exit_event: Arc<OneShotEvent>,
    pool: Arc<P>,
    support: Support,
}

impl<Q, H, P> Supervisor<Q, H, P>
where
    Q: Queue,
    H: Handler<Q::Message>,
    P: Pool,
{
    pub(crate) fn new(
        registry: Arc<Registry<P::Task>>,
        shutdown: Arc<AtomicBool>,
        exit_event: Arc<OneShotEvent>,
        pool: Arc<P>,
        support: Support,
    ) -> Self {
        Self {
            fetchers: Mutex::new(Vec::new()),
            registry,
            stuck: Mutex::new(HashSet::new()),
            shutdown,
            exit_event,
            pool,
            support,
        }
    }

    /// Spawns one fetcher thread per spec in `specs`. Called once by
    /// [`crate::consumer::Consumer::start`].
    pub(crate) fn start(&self, specs: Vec<FetcherSpec<Q, H, P>>) {
        let mut fetchers = self.fetchers.lock();
        debug_assert!(fetchers.is_empty(), "Consumer::start called more than once");
        for spec in specs {
            fetchers.push(spawn_fetcher(spec));
        }
    }

    /// `true` once every fetcher's `JoinHandle` has finished (used by shutdown to decide when
    /// it's safe to return).
    pub(crate) fn fetchers_finished(&self) -> bool {
        self.fetchers.lock().iter().all(|handle| handle.join.is_finished())
    }

    fn revive(&self) {
        let mut fetchers = self.fetchers.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        for handle in fetchers.iter_mut() {
            if handle.join.is_finished() {
                let spec = handle.spec.clone();
                *handle = spawn_fetcher(spec);
                self.support.metrics.increment(Counter::RevivedWorkers, 1);
            }
        }
    }

    fn detect_stuck(&self, stuck_time: std::time::Duration) {
        let snapshot = self.registry.snapshot();
        let now = Instant::now();
        for (key, task) in snapshot {
            if !task.running() {
                continue;
            }
            if now.saturating_duration_since(task.submitted_at()) < stuck_time {
                continue;
            }
            if self.pool.release(&task) {
                self.stuck.lock().insert(key);
                self.support.metrics.increment(Counter::StuckHandlers, 1);
                self.registry.remove(key);
            }
        }
    }

    fn enforce_ceiling(&self, stuck_limit: usize) -> Result<(), SuperviseError> {
        let count = self.stuck.lock().len();
        if count > stuck_limit {
            Err(SuperviseError::StuckCeilingExceeded { count, limit: stuck_limit })
        } else {
            Ok(())
        }
    }

    /// One supervisor tick: (a) revive, (b) detect stuck handlers, (c) enforce the ceiling,
    /// (d) shutdown check. Returns `Ok(true)` if the loop should stop (shutdown observed).
    fn tick(&self, stuck_time: std::time::Duration, stuck_limit: usize) -> Result<bool, SuperviseError> {
        self.revive();
        self.detect_stuck(stuck_time);
        self.enforce_ceiling(stuck_limit)?;
        if self.shutdown.load(Ordering::Acquire) {
            self.exit_event.signal();
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn run(&self, options: &SuperviseOptions) -> Result<(), SuperviseError> {
        let stuck_limit = options.stuck_limit.unwrap_or_else(|| self.pool.max_handlers());
        loop {
            if self.tick(options.stuck_time, stuck_limit)? {
                return Ok(());
            }
            thread::sleep(options.polling_time);
        }
    }
}
