//! Batch key chunker
//!
//! `BatchGetItem` accepts at most [`BATCH_GET_LIMIT`] keys per request. Ids
//! are split into consecutive chunks of that size and the chunks are fetched
//! concurrently. Rows are merged as they arrive, so the combined result is a
//! multiset union with no particular order.

use std::cmp;
use std::future::Future;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::codec::{self, Item};
use crate::store::StoreResult;

/// Maximum number of keys in one batch get request
pub const BATCH_GET_LIMIT: usize = 100;

/// Splits ids into consecutive key chunks of at most [`BATCH_GET_LIMIT`]
///
/// Duplicates are kept as given.
#[must_use]
pub fn chunk_keys(ids: &[Uuid]) -> Vec<Vec<Item>> {
    ids.chunks(BATCH_GET_LIMIT)
        .map(|chunk| chunk.iter().copied().map(codec::key_for).collect())
        .collect()
}

/// Fetches every chunk with at most `concurrency` requests in flight
///
/// No request is made for an empty chunk list. The first failing chunk
/// aborts the whole fetch.
///
/// # Errors
///
/// Returns the first error reported by `fetch`
pub async fn batch_get_all<F, Fut>(
    chunks: Vec<Vec<Item>>,
    concurrency: usize,
    fetch: F,
) -> StoreResult<Vec<Item>>
where
    F: Fn(Vec<Item>) -> Fut,
    Fut: Future<Output = StoreResult<Vec<Item>>>,
{
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let concurrency = cmp::max(1, chunks.len().min(concurrency));
    debug!(chunks = chunks.len(), concurrency, "Dispatching batch get");

    stream::iter(chunks.into_iter().map(fetch))
        .buffer_unordered(concurrency)
        .try_fold(Vec::new(), |mut rows, chunk_rows| async move {
            debug!(rows = chunk_rows.len(), "Batch get chunk completed");
            rows.extend(chunk_rows);
            Ok(rows)
        })
        .await
}
