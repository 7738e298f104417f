//! The public facade tying a [`Queue`], a [`Handler`], and a [`Pool`] together into a running
//! consumer, plus the builder that assembles one.

use crate::error::{BuildError, SuperviseOptions};
use crate::event::OneShotEvent;
use crate::fetcher::FetcherSpec;
use crate::handler::Handler;
use crate::pool::{Pool, ThreadPool};
use crate::queue::Queue;
use crate::registry::Registry;
use crate::support::{Counter, Support};
use crate::supervisor::{Supervision, Supervisor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Collects the options for a [`Consumer`] and assembles one. The common path, using the
/// bundled [`ThreadPool`], is `build()`; supplying a different [`Pool`] implementation (the
/// `with_thread_executor(false)` escape hatch) is `build_with_pool`.
pub struct ConsumerBuilder<Q: Queue, H: Handler<Q::Message>> {
    queue: Arc<Q>,
    handler: Option<Arc<H>>,
    max_workers: usize,
    max_handlers: usize,
    messages_bulk_size: usize,
    worker_polling_time: Duration,
    pool_initializer: Option<Arc<dyn Fn() + Send + Sync>>,
    with_thread_executor: bool,
    support: Support,
}

impl<Q: Queue, H: Handler<Q::Message>> ConsumerBuilder<Q, H> {
    pub fn new(queue: Arc<Q>) -> Self {
        let cpus = num_cpus::get();
        Self {
            queue,
            handler: None,
            max_workers: cpus,
            max_handlers: cpus,
            messages_bulk_size: 1,
            worker_polling_time: Duration::ZERO,
            pool_initializer: None,
            with_thread_executor: true,
            support: Support::default(),
        }
    }

    pub fn handler(mut self, handler: Arc<H>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn max_handlers(mut self, max_handlers: usize) -> Self {
        self.max_handlers = max_handlers;
        self
    }

    pub fn messages_bulk_size(mut self, messages_bulk_size: usize) -> Self {
        self.messages_bulk_size = messages_bulk_size;
        self
    }

    pub fn worker_polling_time(mut self, worker_polling_time: Duration) -> Self {
        self.worker_polling_time = worker_polling_time;
        self
    }

    pub fn pool_initializer(mut self, initializer: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.pool_initializer = Some(initializer);
        self
    }

    pub fn with_thread_executor(mut self, enabled: bool) -> Self {
        self.with_thread_executor = enabled;
        self
    }

    pub fn support(mut self, support: Support) -> Self {
        self.support = support;
        self
    }

    fn validated_handler(&self) -> Result<Arc<H>, BuildError> {
        if self.max_workers == 0 {
            return Err(BuildError::ZeroCapacity { field: "max_workers" });
        }
        if self.max_handlers == 0 {
            return Err(BuildError::ZeroCapacity { field: "max_handlers" });
        }
        self.handler.clone().ok_or(BuildError::MissingHandler)
    }

    /// Builds a `Consumer` backed by the bundled [`ThreadPool`]. This is the default path
    /// (`with_thread_executor` left at `true`).
    pub fn build(self) -> Result<Consumer<Q, H, ThreadPool>, BuildError> {
        if !self.with_thread_executor {
            return Err(BuildError::ProcessPoolUnsupported);
        }
        let handler = self.validated_handler()?;
        let pool = Arc::new(ThreadPool::with_initializer(self.max_handlers, self.pool_initializer.clone()));
        Ok(Consumer::new(
            self.queue,
            handler,
            pool,
            self.max_workers,
            self.messages_bulk_size,
            self.worker_polling_time,
            self.support,
        ))
    }

    /// Builds a `Consumer` backed by a caller-supplied [`Pool`], for when the bundled
    /// thread-based executor isn't what's wanted.
    pub fn build_with_pool<P: Pool>(self, pool: Arc<P>) -> Result<Consumer<Q, H, P>, BuildError> {
        let handler = self.validated_handler()?;
        Ok(Consumer::new(
            self.queue,
            handler,
            pool,
            self.max_workers,
            self.messages_bulk_size,
            self.worker_polling_time,
            self.support,
        ))
    }
}

/// A running (once [`Consumer::start`] is called) queue consumer: `max_workers` fetcher threads
/// feeding a bounded pool, with an optional supervisor loop keeping both healthy.
pub struct Consumer<Q: Queue, H: Handler<Q::Message>, P: Pool> {
    queue: Arc<Q>,
    handler: Arc<H>,
    pool: Arc<P>,
    registry: Arc<Registry<P::Task>>,
    shutdown: Arc<AtomicBool>,
    exit_event: Arc<OneShotEvent>,
    supervisor: Arc<Supervisor<Q, H, P>>,
    max_workers: usize,
    bulk_size: usize,
    polling_time: Duration,
    support: Support,
    started: AtomicBool,
}

impl<Q: Queue, H: Handler<Q::Message>, P: Pool> Consumer<Q, H, P> {
    fn new(
        queue: Arc<Q>,
        handler: Arc<H>,
        pool: Arc<P>,
        max_workers: usize,
        bulk_size: usize,
        polling_time: Duration,
        support: Support,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let exit_event = Arc::new(OneShotEvent::new());
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&registry),
            Arc::clone(&shutdown),
            Arc::clone(&exit_event),
            Arc::clone(&pool),
            support.clone(),
        ));
        // Registers all seven named counters at zero so a sink backed by a real metrics
        // backend sees every series exist before the first message arrives.
        for counter in Counter::ALL {
            support.metrics.increment(counter, 0);
        }
        Self {
            queue,
            handler,
            pool,
            registry,
            shutdown,
            exit_event,
            supervisor,
            max_workers,
            bulk_size,
            polling_time,
            support,
            started: AtomicBool::new(false),
        }
    }

    /// Spawns `max_workers` fetcher threads. Calling this a second time is a logic error: in
    /// debug builds it trips a `debug_assert!`, in release builds the behavior is unspecified.
    pub fn start(&self) {
        let already_started = self.started.swap(true, Ordering::AcqRel);
        debug_assert!(!already_started, "Consumer::start called more than once");
        let specs: Vec<_> = (0..self.max_workers)
            .map(|_| FetcherSpec {
                queue: Arc::clone(&self.queue),
                handler: Arc::clone(&self.handler),
                pool: Arc::clone(&self.pool),
                registry: Arc::clone(&self.registry),
                bulk_size: self.bulk_size,
                polling_time: self.polling_time,
                shutdown: Arc::clone(&self.shutdown),
                support: self.support.clone(),
            })
            .collect();
        self.supervisor.start(specs);
    }

    /// Runs the supervisor loop. `blocking = true` runs it on the calling thread until shutdown
    /// or a fatal [`crate::error::SuperviseError`]; `blocking = false` detaches it onto its own
    /// daemon thread.
    pub fn supervise(&self, blocking: bool, options: SuperviseOptions) -> Supervision {
        if blocking {
            Supervision::Blocking(self.supervisor.run(&options))
        } else {
            let supervisor = Arc::clone(&self.supervisor);
            let join = thread::Builder::new()
                .name("apiary-supervisor".to_string())
                .spawn(move || supervisor.run(&options))
                .expect("failed to spawn supervisor thread");
            Supervision::Detached(join)
        }
    }

    /// Sets the shared shutdown flag and blocks until the supervisor has observed it. Requires
    /// `supervise()` to have been called at least once; otherwise this blocks forever, which is
    /// intentional rather than an oversight; see DESIGN.md.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.exit_event.wait();
    }

    pub fn support(&self) -> &Support {
        &self.support
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::error::BoxError;
    use std::sync::Mutex;
    use std::time::Instant;

    struct VecQueue {
        batch: Mutex<Option<Vec<i32>>>,
        cleaned: Mutex<Vec<i32>>,
    }

    impl Queue for VecQueue {
        type Message = i32;

        fn get(&self) -> Vec<i32> {
            self.batch.lock().unwrap().take().unwrap_or_default()
        }

        fn cleanup(&self, successful: &[i32]) {
            self.cleaned.lock().unwrap().extend_from_slice(successful);
        }
    }

    struct NoopHandler;
    impl Handler<i32> for NoopHandler {
        fn handle(&self, _cursor: &mut Cursor<'_, i32>) -> Result<(), BoxError> {
            Ok(())
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
    fn test_build_without_handler_fails() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(None), cleaned: Mutex::new(Vec::new()) });
        let builder: ConsumerBuilder<VecQueue, NoopHandler> = ConsumerBuilder::new(queue);
        let result = builder.build();
        assert!(matches!(result, Err(BuildError::MissingHandler)));
    }

    #[test]
    fn test_zero_max_workers_is_rejected() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(None), cleaned: Mutex::new(Vec::new()) });
        let result = ConsumerBuilder::new(queue)
            .handler(Arc::new(|_: &mut Cursor<'_, i32>| -> Result<(), BoxError> { Ok(()) }))
            .max_workers(0)
            .build();
        assert!(matches!(result, Err(BuildError::ZeroCapacity { field: "max_workers" })));
    }

    #[test]
    fn test_zero_max_handlers_is_rejected() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(None), cleaned: Mutex::new(Vec::new()) });
        let result = ConsumerBuilder::new(queue)
            .handler(Arc::new(|_: &mut Cursor<'_, i32>| -> Result<(), BoxError> { Ok(()) }))
            .max_handlers(0)
            .build();
        assert!(matches!(result, Err(BuildError::ZeroCapacity { field: "max_handlers" })));
    }

    #[test]
    fn test_process_pool_unsupported_without_custom_pool() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(None), cleaned: Mutex::new(Vec::new()) });
        let result = ConsumerBuilder::new(queue)
            .handler(Arc::new(|_: &mut Cursor<'_, i32>| -> Result<(), BoxError> { Ok(()) }))
            .with_thread_executor(false)
            .build();
        assert!(matches!(result, Err(BuildError::ProcessPoolUnsupported)));
    }

    #[test]
    fn test_consumer_processes_messages_end_to_end() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(Some(vec![1, 2, 3, 4])), cleaned: Mutex::new(Vec::new()) });
        let consumer = ConsumerBuilder::new(Arc::clone(&queue))
            .handler(Arc::new(|cursor: &mut Cursor<'_, i32>| -> Result<(), BoxError> {
                for _ in cursor {}
                Ok(())
            }))
            .max_workers(1)
            .max_handlers(2)
            .messages_bulk_size(2)
            .worker_polling_time(Duration::from_millis(5))
            .build()
            .unwrap();

        consumer.start();
        let supervision = consumer.supervise(false, SuperviseOptions { polling_time: Duration::from_millis(10), ..Default::default() });

        assert!(wait_until(|| queue.cleaned.lock().unwrap().len() == 4, Duration::from_secs(2)));
        consumer.shutdown();

        if let Supervision::Detached(join) = supervision {
            join.join().unwrap().unwrap();
        }
    }

    struct RecordingSink {
        seen: Mutex<Vec<crate::support::Counter>>,
    }

    impl crate::support::MetricsSink for RecordingSink {
        fn increment(&self, counter: crate::support::Counter, _by: u64) {
            self.seen.lock().unwrap().push(counter);
        }
    }

    #[test]
    fn test_build_pre_registers_all_counters_on_a_custom_sink() {
        let queue = Arc::new(VecQueue { batch: Mutex::new(None), cleaned: Mutex::new(Vec::new()) });
        let sink = Arc::new(RecordingSink { seen: Mutex::new(Vec::new()) });
        let support = Support::new(Arc::new(crate::support::TracingLogger), Arc::clone(&sink) as Arc<dyn crate::support::MetricsSink>);
        let _consumer = ConsumerBuilder::new(queue)
            .handler(Arc::new(|_: &mut Cursor<'_, i32>| -> Result<(), BoxError> { Ok(()) }))
            .support(support)
            .build()
            .unwrap();

        let seen = sink.seen.lock().unwrap();
        for counter in crate::support::Counter::ALL {
            assert!(seen.contains(&counter), "{counter:?} was never registered at construction");
        }
    }
}
