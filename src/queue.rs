//! The `Queue` trait: the only thing a caller must implement to use [`crate::Consumer`].
//!
//! The concrete transport (SQS, Kafka, Redis, an in-memory `VecDeque` for tests, ...) is
//! deliberately out of scope for this crate; `Queue` is the seam it plugs into.

/// A source of messages, polled by every fetcher thread in a [`crate::Consumer`].
pub trait Queue: Send + Sync + 'static {
    /// The message type produced by this queue.
    type Message: Send + Sync + 'static;

    /// Blocking pull of the next batch. May block indefinitely; the fetcher that calls this
    /// cannot be cancelled mid-call (see the crate-level docs on shutdown semantics). May
    /// return an empty batch.
    fn get(&self) -> Vec<Self::Message>;

    /// Acknowledgement path, called with the subset of a chunk that the handler successfully
    /// processed. Queues that don't need an ack step simply don't override this.
    #[allow(unused_variables)]
    fn cleanup(&self, successful: &[Self::Message]) {}
}
