//! Completion accounting: turns a chunk plus a handler outcome into a successful/failed split,
//! then drives the queue's cleanup (ack) path, the counters, and the logger from that split.
//!
//! This runs on the pool's worker thread, inline in the task's done-callback (see
//! [`crate::pool::thread::ThreadPool`]), which is why every side effect here is wrapped in its
//! own `catch_unwind`: nothing in here is allowed to unwind across that thread.

use crate::error::HandlerFailure;
use crate::queue::Queue;
use crate::support::{Counter, Support};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Splits a chunk of `chunk_len` messages into `(successful_len, failed_len)` given the
/// handler's outcome.
///
/// `Ok(())` always yields `(chunk_len, 0)`: success means the whole chunk, by definition,
/// independent of how far the cursor was actually advanced. On failure, the in-flight message
/// (the one being processed when the handler errored) is counted as failed along with
/// everything after it: `failed_len = (residue + 1).min(chunk_len)`, where `residue` is how
/// many messages the cursor never got to. The `.min(chunk_len)` clamp keeps a handler that
/// reports consuming more than the chunk held (or nothing at all) from producing an
/// out-of-bounds split.
pub fn split(chunk_len: usize, outcome: &Result<(), HandlerFailure>) -> (usize, usize) {
    match outcome {
        Ok(()) => (chunk_len, 0),
        Err(failure) => {
            let residue = chunk_len.saturating_sub(failure.consumed);
            let failed_len = (residue + 1).min(chunk_len);
            (chunk_len - failed_len, failed_len)
        }
    }
}

/// Applies the side effects of a completed task: increments counters, logs a handler failure
/// if there was one, and acks the successful subset via `Queue::cleanup`. Runs on the pool's
/// worker thread (see the module docs), so the whole body is wrapped in `catch_unwind`: a
/// panicking `Logger`, `MetricsSink`, or `Queue::cleanup` must not take the worker thread down
/// with it. If the panic happened to come from the logger itself, there's no logger left to
/// report it, so the fallback is a bare `eprintln!`.
pub fn complete<Q: Queue>(support: &Support, queue: &Q, chunk: &[Q::Message], outcome: Result<(), HandlerFailure>) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let (successful_len, failed_len) = split(chunk.len(), &outcome);

        if let Err(failure) = &outcome {
            support.metrics.increment(Counter::FailedMessages, failed_len as u64);
            let message = format!("handler failed on a chunk of {} message(s)", chunk.len());
            support.logger.error(&message, failure);
        }

        if successful_len > 0 {
            let successful = &chunk[..successful_len];
            let cleaned = catch_unwind(AssertUnwindSafe(|| queue.cleanup(successful)));
            if let Err(panic) = cleaned {
                let failure = HandlerFailure::from_panic(panic);
                support.logger.error("queue cleanup panicked", &failure);
            }
            support.metrics.increment(Counter::SuccessfulMessages, successful_len as u64);
        }
    }));

    if let Err(payload) = result {
        let failure = HandlerFailure::from_panic(payload);
        eprintln!("apiary: completion accounting panicked, swallowing: {failure}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    fn err(consumed: usize) -> Result<(), HandlerFailure> {
        let source: BoxError = "boom".into();
        Err(HandlerFailure::new(source, consumed))
    }

    #[test]
    fn test_success_is_all_successful() {
        assert_eq!(split(3, &Ok(())), (3, 0));
    }

    #[test]
    fn test_failure_mid_chunk() {
        // chunk of 3, cursor reached c (consumed=3, the cursor advances before returning an
        // item) before the handler failed on it: residue 0, successful=[a,b], failed=[c]
        assert_eq!(split(3, &err(3)), (2, 1));
    }

    #[test]
    fn test_failure_before_consuming_anything() {
        // chunk of 3, handler failed immediately: residue 3, failed=[a,b,c]
        assert_eq!(split(3, &err(0)), (0, 3));
    }

    #[test]
    fn test_failure_clamped_to_chunk_bounds() {
        // a handler that reports having consumed more than the chunk holds (shouldn't happen,
        // but accounting must not panic or underflow) still yields a valid partition: residue
        // saturates to 0, so only the in-flight message is counted as failed.
        assert_eq!(split(3, &err(10)), (2, 1));
    }

    #[test]
    fn test_single_message_chunk_failure() {
        assert_eq!(split(1, &err(0)), (0, 1));
    }

    struct RecordingQueue {
        cleaned: std::sync::Mutex<Vec<i32>>,
    }

    impl Queue for RecordingQueue {
        type Message = i32;

        fn get(&self) -> Vec<i32> {
            Vec::new()
        }

        fn cleanup(&self, successful: &[i32]) {
            self.cleaned.lock().unwrap().extend_from_slice(successful);
        }
    }

    #[test]
    fn test_complete_calls_cleanup_on_success() {
        let queue = RecordingQueue { cleaned: Default::default() };
        let support = Support::default();
        complete(&support, &queue, &[1, 2, 3], Ok(()));
        assert_eq!(*queue.cleaned.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_complete_skips_cleanup_when_nothing_succeeded() {
        let queue = RecordingQueue { cleaned: Default::default() };
        let support = Support::default();
        complete(&support, &queue, &[1, 2, 3], err(0));
        assert!(queue.cleaned.lock().unwrap().is_empty());
    }

    struct PanickingQueue;

    impl Queue for PanickingQueue {
        type Message = i32;

        fn get(&self) -> Vec<i32> {
            Vec::new()
        }

        fn cleanup(&self, _successful: &[i32]) {
            panic!("cleanup blew up");
        }
    }

    #[test]
    fn test_complete_does_not_unwind_when_cleanup_panics() {
        let queue = PanickingQueue;
        let support = Support::default();
        // must not panic the calling (worker) thread
        complete(&support, &queue, &[1, 2, 3], Ok(()));
    }
}
