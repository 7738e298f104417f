//! apiary: a generic concurrent queue consumer.
//!
//! A pool of fetcher threads poll a [`Queue`] for batches of messages, slice each batch into
//! fixed-size chunks, and hand each chunk to a [`Handler`] running inside a bounded [`Pool`].
//! A [`Consumer`]'s optional supervisor loop revives fetcher threads that died and force-releases
//! handler invocations that have been running suspiciously long, so a misbehaving handler or a
//! panicking fetcher degrades throughput rather than wedging the whole consumer.
//!
//! ```no_run
//! use apiary::{ConsumerBuilder, Queue};
//! use std::sync::Arc;
//!
//! struct Messages;
//! impl Queue for Messages {
//!     type Message = String;
//!     fn get(&self) -> Vec<String> {
//!         Vec::new()
//!     }
//! }
//!
//! let consumer = ConsumerBuilder::new(Arc::new(Messages))
//!     .handler(Arc::new(|cursor: &mut apiary::Cursor<'_, String>| -> Result<(), apiary::BoxError> {
//!         for _message in cursor {
//!             // process one message at a time
//!         }
//!         Ok(())
//!     }))
//!     .build()
//!     .expect("missing handler");
//! consumer.start();
//! ```

mod accounting;
mod atomic;
mod channel;
mod chunk;
mod consumer;
mod cursor;
mod error;
mod event;
mod fetcher;
mod handler;
mod pool;
mod queue;
mod registry;
mod support;
mod supervisor;

pub use consumer::{Consumer, ConsumerBuilder};
pub use cursor::Cursor;
pub use error::{BoxError, BuildError, HandlerFailure, SuperviseError, SuperviseOptions};
pub use handler::Handler;
pub use pool::{Pool, PoolTask, ThreadPool};
pub use queue::Queue;
pub use support::{Counter, Counters, Logger, MetricsSink, Support, TracingLogger, LOG_LEVEL_ENV_VAR};
pub use supervisor::Supervision;

#[cfg(feature = "tracing-init")]
pub use support::init_tracing;
