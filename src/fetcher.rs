//! The fetcher worker: polls a [`Queue`], slices each batch into chunks, and submits one handler
//! job per chunk to a [`Pool`], registering a done-callback that feeds the chunk's outcome back
//! into [`crate::accounting`].
//!
//! Each fetcher is just a loop on its own OS thread; `Consumer::start` spawns `max_workers` of
//! them sharing one [`Registry`] and one shutdown flag, and the supervisor's revive step
//! respawns an identical one from its stored [`FetcherSpec`] whenever a thread's body panics.

use crate::accounting;
use crate::chunk::chunk_batch;
use crate::error::HandlerFailure;
use crate::handler::{self, Handler};
use crate::pool::{Pool, PoolTask};
use crate::queue::Queue;
use crate::registry::Registry;
use crate::support::{Counter, Support};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Everything a fetcher thread needs, and everything the supervisor needs in order to spawn an
/// identical replacement after a crash. Cheap to clone: every field is either an `Arc`, a
/// `Copy` value, or (for `Support`) itself just a pair of `Arc`s.
pub struct FetcherSpec<Q: Queue, H: Handler<Q::Message>, P: Pool> {
    pub queue: Arc<Q>,
    pub handler: Arc<H>,
    pub pool: Arc<P>,
    pub registry: Arc<Registry<P::Task>>,
    pub bulk_size: usize,
    pub polling_time: Duration,
    pub shutdown: Arc<AtomicBool>,
    pub support: Support,
}

impl<Q: Queue, H: Handler<Q::Message>, P: Pool> Clone for FetcherSpec<Q, H, P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            handler: Arc::clone(&self.handler),
            pool: Arc::clone(&self.pool),
            registry: Arc::clone(&self.registry),
            bulk_size: self.bulk_size,
            polling_time: self.polling_time,
            shutdown: Arc::clone(&self.shutdown),
            support: self.support.clone(),
        }
    }
}

/// The fetcher loop. Runs until the shared shutdown flag is observed, or forever if it never is
/// (the caller is expected to run this on a dedicated thread). A panic anywhere in a tick is
/// caught, logged, and ends this call. Reviving the fetcher is the supervisor's job, not this
/// function's.
pub fn run<Q, H, P>(spec: FetcherSpec<Q, H, P>)
where
    Q: Queue,
    H: Handler<Q::Message>,
    P: Pool,
{
    loop {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| tick(&spec))) {
            let failure = HandlerFailure::from_panic(payload);
            spec.support.logger.error("fetcher loop panicked", &failure);
            return;
        }
        if spec.shutdown.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(spec.polling_time);
    }
}

fn tick<Q, H, P>(spec: &FetcherSpec<Q, H, P>)
where
    Q: Queue,
    H: Handler<Q::Message>,
    P: Pool,
{
    spec.support.metrics.increment(Counter::RequestMessages, 1);
    let batch = spec.queue.get();
    spec.support.metrics.increment(Counter::ReceivedMessages, batch.len() as u64);

    for chunk in chunk_batch(batch, spec.bulk_size) {
        let chunk = Arc::new(chunk);
        let chunk_len = chunk.len();

        let handler = Arc::clone(&spec.handler);
        let chunk_for_job = Arc::clone(&chunk);
        let task = spec.pool.schedule(move || handler::invoke(handler.as_ref(), &chunk_for_job[..]));

        let key = spec.registry.insert(task.clone());
        let registry = Arc::clone(&spec.registry);
        let queue = Arc::clone(&spec.queue);
        let support = spec.support.clone();
        let chunk_for_cb = Arc::clone(&chunk);
        task.add_done_callback(Box::new(move |outcome| {
            registry.remove(key);
            accounting::complete(&support, queue.as_ref(), &chunk_for_cb[..], outcome);
        }));

        spec.support.metrics.increment(Counter::StartedMessages, chunk_len as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    struct OnceQueue {
        batch: Mutex<Option<Vec<i32>>>,
        shutdown: Arc<AtomicBool>,
        cleaned: Mutex<Vec<i32>>,
    }

    impl Queue for OnceQueue {
        type Message = i32;

        fn get(&self) -> Vec<i32> {
            let batch = self.batch.lock().unwrap().take().unwrap_or_default();
            self.shutdown.store(true, Ordering::Release);
            batch
        }

        fn cleanup(&self, successful: &[i32]) {
            self.cleaned.lock().unwrap().extend_from_slice(successful);
        }
    }

    fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn test_single_tick_chunks_and_completes_successfully() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(OnceQueue {
            batch: Mutex::new(Some(vec![1, 2, 3])),
            shutdown: Arc::clone(&shutdown),
            cleaned: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(ThreadPool::new(2));
        let registry = Arc::new(Registry::new());
        let support = Support::default();

        let spec = FetcherSpec {
            queue: Arc::clone(&queue),
            handler: Arc::new(|cursor: &mut crate::cursor::Cursor<'_, i32>| -> Result<(), crate::error::BoxError> {
                for _ in cursor {}
                Ok(())
            }),
            pool,
            registry,
            bulk_size: 2,
            polling_time: Duration::ZERO,
            shutdown,
            support,
        };

        run(spec);

        assert!(wait_until(|| queue.cleaned.lock().unwrap().len() == 3, Duration::from_secs(1)));
        assert_eq!(*queue.cleaned.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_registry_entry_removed_after_completion() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(OnceQueue {
            batch: Mutex::new(Some(vec![1])),
            shutdown: Arc::clone(&shutdown),
            cleaned: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(ThreadPool::new(1));
        let registry = Arc::new(Registry::new());
        let registry_probe = Arc::clone(&registry);

        let spec = FetcherSpec {
            queue,
            handler: Arc::new(|_: &mut crate::cursor::Cursor<'_, i32>| -> Result<(), crate::error::BoxError> { Ok(()) }),
            pool,
            registry,
            bulk_size: 1,
            polling_time: Duration::ZERO,
            shutdown,
            support: Support::default(),
        };

        run(spec);

        assert!(wait_until(|| registry_probe.is_empty(), Duration::from_secs(1)));
    }

    #[test]
    fn test_failed_chunk_is_not_cleaned_up() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(OnceQueue {
            batch: Mutex::new(Some(vec![1, 2])),
            shutdown: Arc::clone(&shutdown),
            cleaned: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(ThreadPool::new(1));
        let registry = Arc::new(Registry::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_probe = Arc::clone(&attempts);

        let spec = FetcherSpec {
            queue: Arc::clone(&queue),
            handler: Arc::new(move |_: &mut crate::cursor::Cursor<'_, i32>| -> Result<(), crate::error::BoxError> {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("boom".into())
            }),
            pool,
            registry,
            bulk_size: 2,
            polling_time: Duration::ZERO,
            shutdown,
            support: Support::default(),
        };

        run(spec);

        assert!(wait_until(|| attempts_probe.load(Ordering::SeqCst) == 1, Duration::from_secs(1)));
        assert!(queue.cleaned.lock().unwrap().is_empty());
    }
}
