use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::{debug, instrument};

use crate::{
    executor, AppendUploader, BlobType, BlockUploader, ByteStream, ChunkReader, ChunkUploader,
    PageUploader, ProgressTracker, RemoteBlobStore, SharedSource, TransferConfig, TransferError,
    TransferReceipt, TransferResult,
};

const PAGE_ALIGNMENT: u64 = 512;

/// End-to-end chunked upload engine.
///
/// Splits a byte source into chunks, drives them through the configured
/// per-blob-type strategy with bounded concurrency, and commits the result.
/// Any chunk failure aborts the whole transfer: block blobs are unaffected
/// remotely (nothing is visible before commit), while page and append blobs
/// may be left partially written; cleanup or retry-from-scratch is the
/// caller's policy, not this engine's.
pub struct BlobUploader {
    store: Arc<dyn RemoteBlobStore>,
    config: TransferConfig,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn RemoteBlobStore>, config: TransferConfig) -> TransferResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Upload an in-memory buffer
    pub async fn upload_bytes(
        &self,
        data: Bytes,
        blob_type: BlobType,
    ) -> TransferResult<TransferReceipt> {
        let size = data.len() as u64;
        let body: ByteStream = Box::pin(stream::once(async move { Ok(data) }));
        self.upload_stream(body, Some(size), blob_type).await
    }

    /// Upload a forward-only byte stream.
    ///
    /// `total_size = None` is accepted for block and append blobs; chunks are
    /// then discovered by reading to end-of-stream. Page blobs must declare
    /// their full size up front.
    #[instrument(skip(self, body), fields(?blob_type, ?total_size))]
    pub async fn upload_stream(
        &self,
        body: ByteStream,
        total_size: Option<u64>,
        blob_type: BlobType,
    ) -> TransferResult<TransferReceipt> {
        match blob_type {
            BlobType::Block => self.upload_block(body, total_size).await,
            BlobType::Page => self.upload_page(body, total_size).await,
            BlobType::Append => self.upload_append(body, total_size).await,
        }
    }

    /// Upload from a seekable source.
    ///
    /// Block uploads that need neither buffering nor validation read the
    /// source through concurrent sub-streams, so no chunk is held in memory
    /// before its upload slot is free. Everything else falls back to the
    /// forward path over a sequential read of the source.
    #[instrument(skip(self, source), fields(?blob_type))]
    pub async fn upload_seekable<R>(
        &self,
        source: R,
        blob_type: BlobType,
    ) -> TransferResult<TransferReceipt>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
    {
        let shared = SharedSource::new(source).await?;
        let total_size = shared.len();

        let use_forward = self.config.validate_content
            || self.config.transform.is_some()
            || self.config.chunk_size < self.config.min_parallel_chunk_size;

        if blob_type != BlobType::Block || use_forward || !self.config.parallel() {
            let body = shared.into_byte_stream(self.config.chunk_size)?;
            return self.upload_stream(body, Some(total_size), blob_type).await;
        }

        if total_size == 0 {
            return self.empty_block_blob().await;
        }
        if total_size <= self.config.single_shot_threshold {
            let payload = shared.read_at(0, total_size).await?;
            return self.single_shot(payload).await;
        }

        debug!(total_size, "uploading block blob via sub-streams");
        let progress = self.tracker(Some(total_size));
        progress.start();

        let uploader = BlockUploader::new(self.store.clone(), self.config.overwrite);
        let uploader_ref = &uploader;
        let windows = shared.partition(self.config.chunk_size)?;
        let records = executor::drive(
            stream::iter(windows.into_iter().map(Ok)),
            self.config.max_concurrency,
            &progress,
            |window| async move {
                let chunk = window.read().await?;
                uploader_ref.upload_chunk(chunk).await
            },
        )
        .await?;

        uploader.finalize(records).await
    }

    async fn upload_block(
        &self,
        body: ByteStream,
        total_size: Option<u64>,
    ) -> TransferResult<TransferReceipt> {
        if total_size == Some(0) {
            return self.empty_block_blob().await;
        }

        if let Some(size) = total_size {
            if size <= self.config.single_shot_threshold {
                let payload = self.reader(body).read_to_end().await?;
                return self.single_shot(payload).await;
            }
        }

        let progress = self.tracker(total_size);
        progress.start();

        let uploader = BlockUploader::new(self.store.clone(), self.config.overwrite);
        self.drive_forward(body, &uploader, &progress).await
    }

    async fn upload_page(
        &self,
        body: ByteStream,
        total_size: Option<u64>,
    ) -> TransferResult<TransferReceipt> {
        let size = total_size
            .ok_or_else(|| TransferError::invalid("page blob requires a known total size"))?;
        if size % PAGE_ALIGNMENT != 0 {
            return Err(TransferError::invalid(format!(
                "page blob size {size} is not {PAGE_ALIGNMENT}-byte aligned"
            )));
        }
        if self.config.chunk_size % PAGE_ALIGNMENT != 0 {
            return Err(TransferError::invalid(format!(
                "page chunk size {} is not {PAGE_ALIGNMENT}-byte aligned",
                self.config.chunk_size
            )));
        }

        // The blob is created sparse at its full logical size before any
        // page is written; the create response's etag seeds the sequential
        // if-match chain.
        let created = self
            .store
            .create_page_blob(size, self.config.overwrite)
            .await?;
        if size == 0 {
            return Ok(TransferReceipt::from_write(BlobType::Page, created, 0));
        }

        let progress = self.tracker(Some(size));
        progress.start();

        let uploader = PageUploader::new(
            self.store.clone(),
            created.etag.clone(),
            self.config.parallel(),
        );
        self.drive_forward(body, &uploader, &progress).await
    }

    async fn upload_append(
        &self,
        body: ByteStream,
        total_size: Option<u64>,
    ) -> TransferResult<TransferReceipt> {
        if total_size == Some(0) {
            let created = self.store.create_append_blob().await?;
            return Ok(TransferReceipt::from_write(BlobType::Append, created, 0));
        }

        let progress = self.tracker(total_size);
        progress.start();

        let uploader = AppendUploader::new(self.store.clone());
        self.drive_forward(body, &uploader, &progress).await
    }

    async fn drive_forward<U: ChunkUploader>(
        &self,
        body: ByteStream,
        uploader: &U,
        progress: &ProgressTracker,
    ) -> TransferResult<TransferReceipt> {
        let records = executor::drive(
            self.reader(body).into_stream(),
            self.config.max_concurrency,
            progress,
            |chunk| uploader.upload_chunk(chunk),
        )
        .await?;
        uploader.finalize(records).await
    }

    fn reader(&self, body: ByteStream) -> ChunkReader {
        let mut reader = ChunkReader::new(body, self.config.chunk_size);
        if self.config.validate_content {
            reader = reader.with_checksum(self.config.checksum);
        }
        if let Some(factory) = &self.config.transform {
            reader = reader.with_transform(factory());
        }
        reader
    }

    fn tracker(&self, total_size: Option<u64>) -> ProgressTracker {
        ProgressTracker::new(total_size, self.config.progress.clone())
    }

    async fn empty_block_blob(&self) -> TransferResult<TransferReceipt> {
        let progress = self.tracker(Some(0));
        progress.start();
        let receipt = self
            .store
            .put_blob(Bytes::new(), self.config.overwrite)
            .await?;
        Ok(TransferReceipt::from_write(BlobType::Block, receipt, 0))
    }

    async fn single_shot(&self, payload: Bytes) -> TransferResult<TransferReceipt> {
        let size = payload.len() as u64;
        debug!(size, "uploading block blob in a single call");
        let progress = self.tracker(Some(size));
        progress.start();
        let receipt = self.store.put_blob(payload, self.config.overwrite).await?;
        progress.advance(size);
        Ok(TransferReceipt::from_write(BlobType::Block, receipt, size))
    }
}
