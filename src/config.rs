use crate::{ChecksumAlgorithm, ChunkTransformFactory, ProgressCallback, TransferResult};
use crate::error::TransferError;

/// Configuration for one transfer.
///
/// Constructed once at the API boundary and passed by reference into the
/// engine; the engine never mutates it.
#[derive(Clone)]
pub struct TransferConfig {
    /// Size of each uploaded/downloaded chunk (bytes)
    pub chunk_size: u64,

    /// Maximum number of chunk operations in flight at once
    pub max_concurrency: usize,

    /// Compute a digest per chunk on upload and verify server digests on
    /// download
    pub validate_content: bool,

    /// Block blobs at or below this size upload in a single remote call
    pub single_shot_threshold: u64,

    /// Below this chunk size the seekable sub-stream path is not worth it
    /// and chunks are buffered up front instead
    pub min_parallel_chunk_size: u64,

    /// Digest algorithm used when `validate_content` is set
    pub checksum: ChecksumAlgorithm,

    /// Replace the destination if it already exists
    pub overwrite: bool,

    /// Invoked with `(bytes_done, bytes_total)` after each chunk
    pub progress: Option<ProgressCallback>,

    /// Optional per-chunk transform (padding/encryption seam); a fresh
    /// transform instance is created for each transfer
    pub transform: Option<ChunkTransformFactory>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            max_concurrency: 1,
            validate_content: false,
            single_shot_threshold: 64 * 1024 * 1024,
            min_parallel_chunk_size: 4 * 1024 * 1024,
            checksum: ChecksumAlgorithm::Md5,
            overwrite: true,
            progress: None,
            transform: None,
        }
    }
}

impl TransferConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk size
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set maximum concurrent chunk operations
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Enable per-chunk content validation
    pub fn with_content_validation(mut self) -> Self {
        self.validate_content = true;
        self
    }

    /// Set the single-shot upload threshold for block blobs
    pub fn with_single_shot_threshold(mut self, bytes: u64) -> Self {
        self.single_shot_threshold = bytes;
        self
    }

    /// Set the minimum chunk size for the seekable sub-stream path
    pub fn with_min_parallel_chunk_size(mut self, bytes: u64) -> Self {
        self.min_parallel_chunk_size = bytes;
        self
    }

    /// Set the digest algorithm
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = algorithm;
        self
    }

    /// Fail with `DestinationExists` instead of replacing existing blobs
    pub fn without_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Set the progress callback
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Set the chunk transform factory
    pub fn with_transform(mut self, factory: ChunkTransformFactory) -> Self {
        self.transform = Some(factory);
        self
    }

    /// Fail fast on nonsensical parameters, before any I/O
    pub fn validate(&self) -> TransferResult<()> {
        if self.chunk_size == 0 {
            return Err(TransferError::invalid("chunk size must be positive"));
        }
        if self.max_concurrency == 0 {
            return Err(TransferError::invalid("max concurrency must be at least 1"));
        }
        Ok(())
    }

    /// True when the parallel chunk path is requested
    pub fn parallel(&self) -> bool {
        self.max_concurrency > 1
    }
}

impl std::fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferConfig")
            .field("chunk_size", &self.chunk_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("validate_content", &self.validate_content)
            .field("single_shot_threshold", &self.single_shot_threshold)
            .field("min_parallel_chunk_size", &self.min_parallel_chunk_size)
            .field("checksum", &self.checksum)
            .field("overwrite", &self.overwrite)
            .field("progress", &self.progress.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
