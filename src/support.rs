//! Injectable logging and metrics, instead of process-wide singletons.
//!
//! A module-level logger and metrics client are convenient but make tests fight over global
//! state. Here the same pair of concerns is bundled into one `Support` value and threaded
//! explicitly through the `Consumer`, fetcher, and `Supervisor` constructors, so a test can swap
//! in a counting `Logger` or inspect `Counters` directly.

use crate::atomic::{Atomic, AtomicNumber, AtomicU64};
use std::env;
use std::error::Error;
use std::sync::Arc;

/// Where `Logger::error`/`debug`/`info` calls end up. The bundled `TracingLogger` forwards to
/// the `tracing` crate; tests commonly swap in their own implementation to assert on messages.
pub trait Logger: Send + Sync + 'static {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str, err: &(dyn Error + 'static));
}

/// The bundled `Logger`, forwarding to `tracing`. Carries no state of its own: whether anything
/// is actually printed depends on whatever `tracing_subscriber` the embedding binary installs
/// (or on having called [`init_tracing`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "apiary", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "apiary", "{message}");
    }

    fn error(&self, message: &str, err: &(dyn Error + 'static)) {
        tracing::error!(target: "apiary", error = %err, "{message}");
    }
}

/// One of the seven named counters this crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    RequestMessages,
    ReceivedMessages,
    StartedMessages,
    SuccessfulMessages,
    FailedMessages,
    RevivedWorkers,
    StuckHandlers,
}

impl Counter {
    /// Every variant, in the order the seven named counters are documented. Used to
    /// pre-register each one at construction time, before any traffic arrives.
    pub const ALL: [Counter; 7] = [
        Counter::RequestMessages,
        Counter::ReceivedMessages,
        Counter::StartedMessages,
        Counter::SuccessfulMessages,
        Counter::FailedMessages,
        Counter::RevivedWorkers,
        Counter::StuckHandlers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::RequestMessages => "request.messages",
            Counter::ReceivedMessages => "received.messages",
            Counter::StartedMessages => "started.messages",
            Counter::SuccessfulMessages => "successful.messages",
            Counter::FailedMessages => "failed.messages",
            Counter::RevivedWorkers => "revived.workers",
            Counter::StuckHandlers => "stuck.handlers",
        }
    }
}

/// Where `MetricsSink::increment` calls end up. Increment-only from this crate's point of
/// view; a caller-supplied sink is responsible for its own internal concurrency.
pub trait MetricsSink: Send + Sync + 'static {
    fn increment(&self, counter: Counter, by: u64);
}

/// The bundled `MetricsSink`: one `AtomicU64` per named counter, all pre-registered (i.e.
/// initialized to zero) so a metrics backend would see the series exist even before traffic.
#[derive(Debug, Default)]
pub struct Counters {
    request_messages: AtomicU64,
    received_messages: AtomicU64,
    started_messages: AtomicU64,
    successful_messages: AtomicU64,
    failed_messages: AtomicU64,
    revived_workers: AtomicU64,
    stuck_handlers: AtomicU64,
}

impl Counters {
    pub fn request_messages(&self) -> u64 {
        self.request_messages.get()
    }

    pub fn received_messages(&self) -> u64 {
        self.received_messages.get()
    }

    pub fn started_messages(&self) -> u64 {
        self.started_messages.get()
    }

    pub fn successful_messages(&self) -> u64 {
        self.successful_messages.get()
    }

    pub fn failed_messages(&self) -> u64 {
        self.failed_messages.get()
    }

    pub fn revived_workers(&self) -> u64 {
        self.revived_workers.get()
    }

    pub fn stuck_handlers(&self) -> u64 {
        self.stuck_handlers.get()
    }
}

impl MetricsSink for Counters {
    fn increment(&self, counter: Counter, by: u64) {
        let field = match counter {
            Counter::RequestMessages => &self.request_messages,
            Counter::ReceivedMessages => &self.received_messages,
            Counter::StartedMessages => &self.started_messages,
            Counter::SuccessfulMessages => &self.successful_messages,
            Counter::FailedMessages => &self.failed_messages,
            Counter::RevivedWorkers => &self.revived_workers,
            Counter::StuckHandlers => &self.stuck_handlers,
        };
        field.add(by);
    }
}

/// The logger/metrics pair injected into a [`crate::Consumer`] at construction time.
#[derive(Clone)]
pub struct Support {
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Support {
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { logger, metrics }
    }
}

impl Default for Support {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(Counters::default()),
        }
    }
}

/// The env var that selects the default filter level for [`init_tracing`].
pub const LOG_LEVEL_ENV_VAR: &str = "QUEUE_CONSUMER_LOG_LEVEL";

/// Installs a global `tracing` subscriber filtered by [`LOG_LEVEL_ENV_VAR`] (default `"debug"`)
/// if one isn't already installed. This is opt-in: libraries shouldn't normally install
/// subscribers on an embedding application's behalf, so this is offered behind the
/// `tracing-init` feature for callers who want one-line setup. Safe to call more than once;
/// only the first call has any effect.
#[cfg(feature = "tracing-init")]
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let level = env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| "debug".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
