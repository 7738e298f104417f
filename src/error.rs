use std::time::Duration;

/// Errors that can occur while constructing a [`crate::Consumer`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Neither a `handler` nor a queue that implements `Handler` was supplied.
    #[error("messages handler is not defined: pass one to the builder or implement `Handler` on the queue")]
    MissingHandler,

    /// `with_thread_executor(false)` was requested but no custom `Pool` was supplied to take
    /// its place. This crate does not bundle a subprocess-backed pool: there's no serialization
    /// layer for shipping jobs and results across a process boundary, so a thread-backed `Pool`
    /// is the only one included.
    #[error(
        "process-backed pools are not bundled; supply a custom `Pool` via \
         `ConsumerBuilder::build_with_pool` or leave `with_thread_executor` at its default of `true`"
    )]
    ProcessPoolUnsupported,

    /// `max_workers` or `max_handlers` was zero.
    #[error("{field} must be at least 1, got 0")]
    ZeroCapacity { field: &'static str },
}

/// Fatal errors that can terminate a running supervisor loop.
#[derive(Debug, thiserror::Error)]
pub enum SuperviseError {
    /// More handler tasks than `stuck_limit` have been force-released for exceeding
    /// `stuck_time`. The consumer does not auto-recover from this; the caller must shut down.
    #[error("number of stuck handlers {count} is more than the limit {limit}")]
    StuckCeilingExceeded { count: usize, limit: usize },
}

/// An opaque, boxed handler error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The outcome of a handler invocation that did not complete successfully, carrying both the
/// underlying error and how far into the chunk the handler got before it failed. See
/// [`crate::accounting`] for how `consumed` is turned into a successful/failed split.
#[derive(Debug)]
pub struct HandlerFailure {
    pub source: BoxError,
    pub consumed: usize,
}

impl HandlerFailure {
    pub fn new(source: BoxError, consumed: usize) -> Self {
        Self { source, consumed }
    }

    /// Builds a `HandlerFailure` out of a caught panic payload. `consumed` is unknown when a
    /// handler panics instead of returning `Err`, so the whole chunk is conservatively treated
    /// as failed (`consumed = 0`).
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked with a non-string payload".to_string()
        };
        Self {
            source: message.into(),
            consumed: 0,
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler failed after consuming {} message(s): {}", self.consumed, self.source)
    }
}

impl std::error::Error for HandlerFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Options accepted by [`crate::Consumer::supervise`].
#[derive(Debug, Clone)]
pub struct SuperviseOptions {
    pub polling_time: Duration,
    pub stuck_time: Duration,
    pub stuck_limit: Option<usize>,
}

impl Default for SuperviseOptions {
    fn default() -> Self {
        Self {
            polling_time: Duration::from_secs(1),
            stuck_time: Duration::from_secs(60),
            stuck_limit: None,
        }
    }
}
