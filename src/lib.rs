//! # lodestream: concurrency-bounded chunked blob transfer
//!
//! `lodestream` is the transfer engine that sits between an application and a
//! range-capable remote object store: it splits large uploads and downloads
//! into fixed-size chunks, drives them with bounded concurrency, tracks
//! progress, and reassembles the results into one logical operation.
//!
//! ## Key pieces
//!
//! - **Chunk planner**: deterministic `(offset, length)` layout for any
//!   object, including the short final chunk
//! - **Forward reader / sub-streams**: fixed-size chunks from a one-way
//!   stream, or lock-guarded random-access windows over a shared seekable
//!   source for out-of-order parallel reads
//! - **Bounded executor**: a sliding window of at most `max_concurrency`
//!   chunk operations, refilled on every completion
//! - **Uploader strategies**: block (stage + ordered commit), page
//!   (sparse writes, zero-range skip, etag chaining), append (position
//!   preconditions, create-on-missing)
//! - **Downloader**: ranged reads with integrity verification and parallel
//!   offset-keyed assembly into a seekable sink
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lodestream::prelude::*;
//!
//! # async fn example(store: Arc<dyn RemoteBlobStore>) -> TransferResult<()> {
//! let config = TransferConfig::new()
//!     .with_chunk_size(4 * 1024 * 1024)
//!     .with_max_concurrency(4);
//!
//! let uploader = BlobUploader::new(store.clone(), config.clone())?;
//! let file = tokio::fs::File::open("video.mp4").await?;
//! let receipt = uploader.upload_seekable(file, BlobType::Block).await?;
//! println!("uploaded {} bytes, etag {:?}", receipt.bytes_transferred, receipt.etag);
//!
//! let downloader = BlobDownloader::new(store, config)?;
//! let target = tokio::fs::File::create("copy.mp4").await?;
//! downloader.download_to(target, 0, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The remote store itself (auth, retries, wire formats) stays behind the
//! [`RemoteBlobStore`] trait; this crate only assumes ranged reads and the
//! per-blob-type write calls.

mod checksum;
mod config;
mod download;
mod error;
pub mod executor;
mod plan;
mod progress;
mod source;
pub mod store;
mod substream;
mod upload;
mod uploader;

pub use checksum::{ChecksumAlgorithm, ContentDigest};
pub use config::TransferConfig;
pub use download::{BlobDownloader, DownloadStream};
pub use error::{TransferError, TransferResult};
pub use executor::ChunkRecord;
pub use plan::{plan_ranges, ByteRange, ChunkBoundary, ChunkPlan, RangeDescriptor};
pub use progress::{ProgressCallback, ProgressTracker};
pub use source::{ChunkDescriptor, ChunkReader, ChunkTransform, ChunkTransformFactory};
pub use store::{
    AppendReceipt, ByteStream, RemoteBlobStore, RemoteRead, WriteConditions, WriteReceipt,
};
pub use substream::{SharedSink, SharedSource, SubStream};
pub use upload::BlobUploader;
pub use uploader::{
    block_id_for_offset, AppendUploader, BlobType, BlockUploader, ChunkUploader, PageUploader,
    TransferReceipt,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobDownloader, BlobType, BlobUploader, ByteStream, RemoteBlobStore, TransferConfig,
        TransferError, TransferReceipt, TransferResult,
    };
}
