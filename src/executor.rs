use std::future::Future;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tracing::debug;

use crate::{ProgressTracker, TransferResult};

/// Completion record for one chunk operation
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Byte offset of the chunk this record belongs to
    pub offset: u64,
    /// Bytes transferred (or accounted for, e.g. skipped zero pages)
    pub length: u64,
    /// Block id assigned by a block-blob stage call
    pub block_id: Option<String>,
    /// Etag returned by the remote write, when one was returned
    pub etag: Option<String>,
}

impl ChunkRecord {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length,
            block_id: None,
            etag: None,
        }
    }

    pub fn with_block_id(mut self, block_id: String) -> Self {
        self.block_id = Some(block_id);
        self
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }
}

/// Drive chunk operations from `source` through `op` with at most
/// `max_concurrency` outstanding at once.
///
/// With `max_concurrency == 1` chunks run strictly sequentially. Otherwise a
/// sliding window launches up to `max_concurrency` operations and refills
/// from the source on every completion, so peak outstanding operations stay
/// bounded no matter how many chunks the transfer has. Chunk buffers are
/// several megabytes by default, which makes the bound a memory guarantee,
/// not just a politeness limit.
///
/// Results are sorted by originating byte offset before they are returned;
/// completion order under parallelism is meaningless to callers. The first
/// error aborts the drive: remaining window futures are dropped and their
/// results discarded, and the caller must treat the transfer as failed with
/// the remote possibly partially written.
pub async fn drive<T, S, F, Fut>(
    source: S,
    max_concurrency: usize,
    progress: &ProgressTracker,
    op: F,
) -> TransferResult<Vec<ChunkRecord>>
where
    S: futures_core::Stream<Item = TransferResult<T>> + Send,
    F: Fn(T) -> Fut,
    Fut: Future<Output = TransferResult<ChunkRecord>> + Send,
{
    let mut source = Box::pin(source);
    let mut records = Vec::new();

    if max_concurrency <= 1 {
        while let Some(item) = source.next().await {
            let record = op(item?).await?;
            progress.advance(record.length);
            records.push(record);
        }
        records.sort_by_key(|r| r.offset);
        return Ok(records);
    }

    let mut window = FuturesUnordered::new();
    let mut exhausted = false;

    while window.len() < max_concurrency && !exhausted {
        match source.next().await {
            Some(item) => window.push(op(item?)),
            None => exhausted = true,
        }
    }
    debug!(in_flight = window.len(), max_concurrency, "chunk window filled");

    while let Some(completed) = window.next().await {
        let record = completed?;
        progress.advance(record.length);
        records.push(record);

        if !exhausted {
            match source.next().await {
                Some(item) => window.push(op(item?)),
                None => exhausted = true,
            }
        }
    }

    records.sort_by_key(|r| r.offset);
    Ok(records)
}
