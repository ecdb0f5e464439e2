use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ByteRange, ContentDigest, RangeDescriptor, TransferResult};

/// Stream of bytes for blob content
pub type ByteStream =
    std::pin::Pin<Box<dyn futures_core::Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Remote object store collaborator.
///
/// The transfer engine drives these per-blob-type operations but owns none of
/// the transport concerns behind them (auth, retry, serialization). Stores
/// report 404-class failures as [`TransferError::NotFound`], 412-class
/// conditional failures as [`TransferError::PreconditionFailed`], and
/// create/commit conflicts under `overwrite = false` as
/// [`TransferError::DestinationExists`].
///
/// [`TransferError::NotFound`]: crate::TransferError::NotFound
/// [`TransferError::PreconditionFailed`]: crate::TransferError::PreconditionFailed
/// [`TransferError::DestinationExists`]: crate::TransferError::DestinationExists
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    /// Single-shot block blob upload, used below the single-shot threshold
    async fn put_blob(&self, payload: Bytes, overwrite: bool) -> TransferResult<WriteReceipt>;

    /// Stage one uncommitted block; invisible until committed
    async fn stage_block(&self, block_id: &str, payload: Bytes) -> TransferResult<()>;

    /// Commit previously staged blocks, in the given order
    async fn commit_block_list(
        &self,
        block_ids: Vec<String>,
        overwrite: bool,
    ) -> TransferResult<WriteReceipt>;

    /// Create a sparse page blob of the full logical size
    async fn create_page_blob(&self, size: u64, overwrite: bool) -> TransferResult<WriteReceipt>;

    /// Write one page range at its exact byte offsets
    async fn upload_pages(
        &self,
        range: RangeDescriptor,
        payload: Bytes,
        conditions: WriteConditions,
    ) -> TransferResult<WriteReceipt>;

    /// Create an empty append blob
    async fn create_append_blob(&self) -> TransferResult<WriteReceipt>;

    /// Append one block at the blob's current end
    async fn append_block(
        &self,
        payload: Bytes,
        conditions: WriteConditions,
    ) -> TransferResult<AppendReceipt>;

    /// Ranged read; `None` reads the whole blob
    async fn get_blob(&self, range: Option<ByteRange>) -> TransferResult<RemoteRead>;
}

/// Optimistic-concurrency conditions attached to a remote write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteConditions {
    /// Write only if the blob's current etag matches
    pub if_match: Option<String>,

    /// Append only if the blob's committed length equals this offset
    pub append_position: Option<u64>,
}

impl WriteConditions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn if_match<S: Into<String>>(etag: S) -> Self {
        Self {
            if_match: Some(etag.into()),
            append_position: None,
        }
    }

    pub fn at_append_position(offset: u64) -> Self {
        Self {
            if_match: None,
            append_position: Some(offset),
        }
    }
}

/// Result of a successful remote write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub etag: Option<String>,
    /// Seconds since the Unix epoch, when the store reports it
    pub last_modified: Option<i64>,
}

/// Result of a successful append, carrying the offset at which the block
/// was committed
#[derive(Debug, Clone)]
pub struct AppendReceipt {
    pub receipt: WriteReceipt,
    pub append_offset: u64,
}

/// Result of a ranged read
pub struct RemoteRead {
    /// Length of the returned payload in bytes
    pub size: u64,
    /// Total size of the remote object, when the store reports it
    pub total_size: Option<u64>,
    pub etag: Option<String>,
    /// Server-computed digest over the returned payload, when available
    pub content_digest: Option<ContentDigest>,
    /// Range actually served, for ranged requests
    pub resolved: Option<RangeDescriptor>,
    pub stream: ByteStream,
}
