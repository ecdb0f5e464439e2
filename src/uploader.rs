use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ChunkDescriptor, ChunkRecord, RangeDescriptor, RemoteBlobStore, TransferError, TransferResult,
    WriteConditions, WriteReceipt,
};

/// Blob type being written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobType {
    /// Staged blocks, visible only after an explicit commit
    Block,
    /// Sparse fixed-size blob written at arbitrary 512-aligned ranges
    Page,
    /// Blob writable only at its current end
    Append,
}

/// Caller-visible result of a completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub blob_type: BlobType,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    pub bytes_transferred: u64,
}

impl TransferReceipt {
    pub(crate) fn from_write(
        blob_type: BlobType,
        receipt: WriteReceipt,
        bytes_transferred: u64,
    ) -> Self {
        Self {
            blob_type,
            etag: receipt.etag,
            last_modified: receipt.last_modified,
            bytes_transferred,
        }
    }
}

/// Per-blob-type upload strategy.
///
/// Selected once per transfer and handed to the generic executor as a
/// capability object; the executor never branches on blob type.
#[async_trait]
pub trait ChunkUploader: Send + Sync {
    /// Turn one chunk into one remote write
    async fn upload_chunk(&self, chunk: ChunkDescriptor) -> TransferResult<ChunkRecord>;

    /// Combine all chunk results into the final commit step
    async fn finalize(&self, records: Vec<ChunkRecord>) -> TransferResult<TransferReceipt>;
}

/// Deterministic block id for a chunk: fixed-width zero-padded offset,
/// base64-encoded. Identical offsets always map to identical ids, so a
/// re-staged chunk overwrites its previous attempt instead of leaking blocks.
pub fn block_id_for_offset(offset: u64) -> String {
    BASE64.encode(format!("{offset:032}"))
}

/// Block blob strategy: stage one block per chunk, then commit the block
/// list in offset order.
pub struct BlockUploader {
    store: Arc<dyn RemoteBlobStore>,
    overwrite: bool,
}

impl BlockUploader {
    pub fn new(store: Arc<dyn RemoteBlobStore>, overwrite: bool) -> Self {
        Self { store, overwrite }
    }
}

#[async_trait]
impl ChunkUploader for BlockUploader {
    async fn upload_chunk(&self, chunk: ChunkDescriptor) -> TransferResult<ChunkRecord> {
        let block_id = block_id_for_offset(chunk.offset);
        let length = chunk.len();
        self.store.stage_block(&block_id, chunk.payload).await?;
        Ok(ChunkRecord::new(chunk.offset, length).with_block_id(block_id))
    }

    async fn finalize(&self, mut records: Vec<ChunkRecord>) -> TransferResult<TransferReceipt> {
        records.sort_by_key(|r| r.offset);
        let bytes_transferred: u64 = records.iter().map(|r| r.length).sum();

        if records.is_empty() {
            // Nothing was staged; an empty source still produces a blob.
            let receipt = self
                .store
                .put_blob(bytes::Bytes::new(), self.overwrite)
                .await?;
            return Ok(TransferReceipt::from_write(BlobType::Block, receipt, 0));
        }

        let block_ids: Vec<String> = records
            .into_iter()
            .map(|r| {
                r.block_id
                    .ok_or_else(|| TransferError::invalid("staged block without an id"))
            })
            .collect::<TransferResult<_>>()?;

        debug!(blocks = block_ids.len(), "committing block list");
        let receipt = self
            .store
            .commit_block_list(block_ids, self.overwrite)
            .await?;
        Ok(TransferReceipt::from_write(
            BlobType::Block,
            receipt,
            bytes_transferred,
        ))
    }
}

/// Page blob strategy.
///
/// All-zero chunks are skipped outright: page blobs are sparse and unwritten
/// pages read back as zero. Sequential transfers chain an `if_match`
/// condition from each write's etag to the next, detecting concurrent
/// modification mid-transfer; parallel transfers set no condition because
/// racing writes would trip it spuriously.
pub struct PageUploader {
    store: Arc<dyn RemoteBlobStore>,
    parallel: bool,
    etag: tokio::sync::Mutex<Option<String>>,
}

impl PageUploader {
    /// `initial_etag` seeds the sequential chain, normally from the create
    /// call's response. Ignored for parallel transfers.
    pub fn new(
        store: Arc<dyn RemoteBlobStore>,
        initial_etag: Option<String>,
        parallel: bool,
    ) -> Self {
        Self {
            store,
            parallel,
            etag: tokio::sync::Mutex::new(if parallel { None } else { initial_etag }),
        }
    }

    fn is_all_zero(payload: &[u8]) -> bool {
        payload.iter().all(|byte| *byte == 0)
    }
}

#[async_trait]
impl ChunkUploader for PageUploader {
    async fn upload_chunk(&self, chunk: ChunkDescriptor) -> TransferResult<ChunkRecord> {
        let length = chunk.len();
        if Self::is_all_zero(&chunk.payload) {
            debug!(offset = chunk.offset, length, "skipping all-zero page range");
            return Ok(ChunkRecord::new(chunk.offset, length));
        }

        let range = RangeDescriptor::new(chunk.offset, chunk.offset + length - 1)?;

        if self.parallel {
            let receipt = self
                .store
                .upload_pages(range, chunk.payload, WriteConditions::none())
                .await?;
            return Ok(ChunkRecord::new(chunk.offset, length).with_etag(receipt.etag));
        }

        // Sequential: the lock is uncontended; it exists to thread the etag
        // from one write into the next write's condition.
        let mut etag = self.etag.lock().await;
        let conditions = match etag.clone() {
            Some(current) => WriteConditions::if_match(current),
            None => WriteConditions::none(),
        };
        let receipt = self
            .store
            .upload_pages(range, chunk.payload, conditions)
            .await?;
        etag.clone_from(&receipt.etag);
        Ok(ChunkRecord::new(chunk.offset, length).with_etag(receipt.etag))
    }

    async fn finalize(&self, records: Vec<ChunkRecord>) -> TransferResult<TransferReceipt> {
        let bytes_transferred: u64 = records.iter().map(|r| r.length).sum();
        let etag = match &*self.etag.lock().await {
            Some(etag) => Some(etag.clone()),
            None => records.iter().rev().find_map(|r| r.etag.clone()),
        };
        Ok(TransferReceipt {
            blob_type: BlobType::Page,
            etag,
            last_modified: None,
            bytes_transferred,
        })
    }
}

/// Append blob strategy.
///
/// The first successful append teaches us where the blob's committed end
/// was; every later chunk then carries `base + chunk.offset` as an explicit
/// append-position condition, so out-of-order completions are rejected by
/// the remote instead of silently reordering data. A position mismatch
/// surfaces as a precondition failure and aborts the transfer.
///
/// Under parallel execution, chunks dispatched before the first append
/// completes have no base to condition on and are sent unguarded; the
/// ordering guarantee starts once the base offset is learned. Sequential
/// transfers (the default) guard every chunk after the first.
pub struct AppendUploader {
    store: Arc<dyn RemoteBlobStore>,
    base_offset: parking_lot::Mutex<Option<u64>>,
    created: AtomicBool,
}

impl AppendUploader {
    pub fn new(store: Arc<dyn RemoteBlobStore>) -> Self {
        Self {
            store,
            base_offset: parking_lot::Mutex::new(None),
            created: AtomicBool::new(false),
        }
    }

    fn conditions_for(&self, chunk_offset: u64) -> WriteConditions {
        match *self.base_offset.lock() {
            Some(base) => WriteConditions::at_append_position(base + chunk_offset),
            None => WriteConditions::none(),
        }
    }
}

#[async_trait]
impl ChunkUploader for AppendUploader {
    async fn upload_chunk(&self, chunk: ChunkDescriptor) -> TransferResult<ChunkRecord> {
        let length = chunk.len();
        let conditions = self.conditions_for(chunk.offset);

        let attempt = self
            .store
            .append_block(chunk.payload.clone(), conditions.clone())
            .await;

        let appended = match attempt {
            Err(err)
                if err.is_not_found()
                    && chunk.offset == 0
                    && !self.created.swap(true, Ordering::SeqCst) =>
            {
                // Blob does not exist yet: create it, then retry the append
                // exactly once. The chunk payload is an owned buffer, so the
                // retry re-sends the same bytes from the start of the chunk.
                debug!("append target missing, creating append blob");
                self.store.create_append_blob().await?;
                self.store.append_block(chunk.payload, conditions).await?
            }
            other => other?,
        };

        let mut base = self.base_offset.lock();
        if base.is_none() {
            *base = Some(appended.append_offset.saturating_sub(chunk.offset));
        }

        Ok(ChunkRecord::new(chunk.offset, length).with_etag(appended.receipt.etag))
    }

    async fn finalize(&self, records: Vec<ChunkRecord>) -> TransferResult<TransferReceipt> {
        let bytes_transferred: u64 = records.iter().map(|r| r.length).sum();
        Ok(TransferReceipt {
            blob_type: BlobType::Append,
            etag: records.iter().rev().find_map(|r| r.etag.clone()),
            last_modified: None,
            bytes_transferred,
        })
    }
}
