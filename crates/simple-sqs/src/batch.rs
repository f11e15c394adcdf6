//! Chunk-and-reassemble strategy for batch-limited backend calls.
//!
//! An ordered input of N items is partitioned into `ceil(N / max)` chunks of
//! at most `max` items. Chunking is a pure partition: the concatenation of
//! the chunks, in order, is the input. Each chunk is handed to the
//! single-batch operation; all chunks run concurrently and their outcomes
//! are returned in input order.

use crate::error::{BatchEntryFailure, QueueError};
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on chunk calls [`run_counted`] keeps in flight at once
pub const MAX_CONCURRENT_CHUNKS: usize = 16;

/// Outcome of one chunk
#[derive(Debug)]
pub struct ChunkOutcome<R> {
    /// Position of the chunk's first item in the input
    pub offset: usize,
    /// Number of input items in the chunk
    pub len: usize,
    pub result: Result<Vec<R>, QueueError>,
}

/// Split `items` into ordered chunks of at most `max_batch` items
pub fn partition<T>(items: Vec<T>, max_batch: usize) -> Vec<Vec<T>> {
    let max_batch = max_batch.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(max_batch));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(max_batch).collect());
    }
    chunks
}

/// Run `op` once per chunk of `items` and return the outcomes in input order.
///
/// Empty input makes no call. Input that fits in one batch is passed to `op`
/// directly.
pub async fn run_partitioned<T, R, F, Fut>(
    items: Vec<T>,
    max_batch: usize,
    op: F,
) -> Vec<ChunkOutcome<R>>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, QueueError>>,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    if total <= max_batch {
        let result = op(items).await;
        return vec![ChunkOutcome {
            offset: 0,
            len: total,
            result,
        }];
    }

    let chunks = partition(items, max_batch);
    debug!(total, chunks = chunks.len(), max_batch, "Splitting request into batches");

    let mut offset = 0;
    let pending = chunks.into_iter().map(|chunk| {
        let chunk_offset = offset;
        let len = chunk.len();
        offset += len;
        let call = op(chunk);
        async move {
            ChunkOutcome {
                offset: chunk_offset,
                len,
                result: call.await,
            }
        }
    });

    join_all(pending).await
}

/// Run `op` once per chunk of a request for `total` items, passing each
/// chunk's size, and yield the outcomes in input order.
///
/// Chunk sizes are produced lazily and at most [`MAX_CONCURRENT_CHUNKS`]
/// calls run at once, so a large `total` allocates nothing up front. A
/// consumer that stops polling the stream issues no further calls.
pub fn run_counted<R, F, Fut>(
    total: usize,
    max_batch: usize,
    op: F,
) -> impl Stream<Item = ChunkOutcome<R>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<Vec<R>, QueueError>>,
{
    let max_batch = max_batch.max(1);
    if total > max_batch {
        debug!(total, max_batch, "Splitting request into batches");
    }

    stream::iter((0..total).step_by(max_batch))
        .map(move |offset| {
            let len = max_batch.min(total - offset);
            let call = op(len);
            async move {
                ChunkOutcome {
                    offset,
                    len,
                    result: call.await,
                }
            }
        })
        .buffered(MAX_CONCURRENT_CHUNKS)
}

/// Concatenate chunk results, failing with the first chunk error in input order
pub fn flatten<R>(outcomes: Vec<ChunkOutcome<R>>) -> Result<Vec<R>, QueueError> {
    let mut flattened = Vec::new();
    for outcome in outcomes {
        flattened.extend(outcome.result?);
    }
    Ok(flattened)
}

/// Reassemble per-entry outcomes into successes and indexed failures.
///
/// A failed chunk marks every entry it contained as failed with the chunk's
/// error.
pub fn collect_entries<R>(
    outcomes: Vec<ChunkOutcome<Result<R, QueueError>>>,
) -> (Vec<R>, Vec<BatchEntryFailure>) {
    let mut succeeded = Vec::new();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(entries) => {
                for (position, entry) in entries.into_iter().enumerate() {
                    match entry {
                        Ok(value) => succeeded.push(value),
                        Err(e) => failures.push(BatchEntryFailure::new(outcome.offset + position, e)),
                    }
                }
            }
            Err(e) => {
                let shared = Arc::new(e);
                for index in outcome.offset..outcome.offset + outcome.len {
                    failures.push(BatchEntryFailure::shared(index, Arc::clone(&shared)));
                }
            }
        }
    }

    (succeeded, failures)
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
