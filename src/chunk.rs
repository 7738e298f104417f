//! Splits a batch pulled from the queue into fixed-size, contiguous chunks.

/// Splits `batch` into contiguous chunks of at most `size` messages each, preserving order.
/// The last chunk may be shorter than `size`. An empty `batch` yields no chunks at all. `size`
/// is clamped to a minimum of 1 so a misconfigured `messages_bulk_size` of 0 degrades to
/// singleton chunks rather than looping forever.
pub fn chunk_batch<M>(batch: Vec<M>, size: usize) -> Vec<Vec<M>> {
    let size = size.max(1);
    if batch.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::with_capacity(batch.len().div_ceil(size));
    let mut items = batch.into_iter();
    loop {
        let chunk: Vec<M> = (&mut items).take(size).collect();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    chunks
}
