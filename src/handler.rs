//! The handler wrapper described in the partial-progress protocol: invokes the user's
//! `Handler`, and on failure captures how far the [`Cursor`] got so [`crate::accounting`] can
//! recover which messages in the chunk actually completed.

use crate::cursor::Cursor;
use crate::error::{BoxError, HandlerFailure};

/// User code that processes one chunk's worth of messages.
///
/// Implementations should advance the cursor before (or while) processing each item: a handler
/// that returns `Err` after calling `cursor.next()` three times is understood to have fully
/// processed the first three messages and to have failed on (or before reaching) the fourth.
pub trait Handler<M>: Send + Sync + 'static {
    fn handle(&self, cursor: &mut Cursor<'_, M>) -> Result<(), BoxError>;
}

impl<M, F> Handler<M> for F
where
    F: Fn(&mut Cursor<'_, M>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn handle(&self, cursor: &mut Cursor<'_, M>) -> Result<(), BoxError> {
        self(cursor)
    }
}

/// Runs `handler` over `chunk`, producing the `Result` that [`crate::pool::Pool::schedule`]
/// jobs are built from. On success the whole chunk is considered successful regardless of how
/// far the cursor actually advanced; that's the accounting rule, not a detail of this
/// function. On failure, `HandlerFailure::consumed` records the cursor's position at the
/// moment of the error.
pub fn invoke<M, H: Handler<M> + ?Sized>(handler: &H, chunk: &[M]) -> Result<(), HandlerFailure> {
    let mut cursor = Cursor::new(chunk);
    handler
        .handle(&mut cursor)
        .map_err(|source| HandlerFailure::new(source, cursor.consumed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_ignores_cursor_position() {
        let handler = |cursor: &mut Cursor<'_, i32>| {
            cursor.next();
            Ok(())
        };
        let chunk = vec![1, 2, 3];
        assert!(invoke(&handler, &chunk).is_ok());
    }

    #[test]
    fn test_failure_captures_consumed() {
        let handler = |cursor: &mut Cursor<'_, i32>| -> Result<(), BoxError> {
            cursor.next();
            cursor.next();
            Err("boom".into())
        };
        let chunk = vec![1, 2, 3];
        let failure = invoke(&handler, &chunk).unwrap_err();
        assert_eq!(failure.consumed, 2);
    }

    #[test]
    fn test_immediate_failure_has_zero_consumed() {
        let handler = |_cursor: &mut Cursor<'_, i32>| -> Result<(), BoxError> { Err("boom".into()) };
        let chunk = vec![1, 2, 3];
        let failure = invoke(&handler, &chunk).unwrap_err();
        assert_eq!(failure.consumed, 0);
    }
}
