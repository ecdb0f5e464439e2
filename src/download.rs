use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use tokio::io::{AsyncSeek, AsyncWrite};
use tracing::{debug, instrument};

use crate::{
    executor, plan, ByteRange, ChunkRecord, ContentDigest, ProgressTracker, RangeDescriptor,
    RemoteBlobStore, RemoteRead, SharedSink, TransferConfig, TransferError, TransferResult,
};

/// Chunked, range-based download engine, the mirror of the uploader.
pub struct BlobDownloader {
    store: Arc<dyn RemoteBlobStore>,
    config: TransferConfig,
}

impl BlobDownloader {
    pub fn new(store: Arc<dyn RemoteBlobStore>, config: TransferConfig) -> TransferResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Issue one ranged GET and expose the result as a consumable stream.
    ///
    /// `length = None` reads to the end of the object. The returned stream
    /// is bound to the originating response; integrity verification, when
    /// enabled, compares the server digest against one computed over the
    /// received bytes.
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> TransferResult<DownloadStream> {
        let range = ByteRange::for_request(offset, length)?;
        let read = self.store.get_blob(Some(range)).await?;
        check_served_start(offset, &read)?;
        Ok(DownloadStream {
            size: read.size,
            etag: read.etag.clone(),
            validate: self.config.validate_content,
            read,
        })
    }

    /// Download `[offset, offset + length)` into a seekable sink, fanning
    /// sub-ranges out with bounded concurrency.
    ///
    /// The first ranged GET covers the head chunk and learns the total
    /// object size; the remainder is split into sub-ranges of at most the
    /// configured chunk size and driven through the bounded executor. Each
    /// completed sub-range is written at its own absolute offset in the
    /// sink, so completion order cannot corrupt byte placement. Returns the
    /// number of bytes written.
    #[instrument(skip(self, sink))]
    pub async fn download_to<W>(
        &self,
        sink: W,
        offset: u64,
        length: Option<u64>,
    ) -> TransferResult<u64>
    where
        W: AsyncWrite + AsyncSeek + Unpin + Send,
    {
        let head_len = match length {
            Some(len) => {
                if len == 0 {
                    return Err(TransferError::invalid("download length must be positive"));
                }
                len.min(self.config.chunk_size)
            }
            None => self.config.chunk_size,
        };
        let head_range = ByteRange::for_request(offset, Some(head_len))?;
        let head = self.store.get_blob(Some(head_range)).await?;
        check_served_start(offset, &head)?;

        let end = match self.resolve_end(offset, length, &head)? {
            Some(end) => end,
            None => return Ok(0),
        };
        let progress = ProgressTracker::new(Some(end - offset + 1), self.config.progress.clone());
        progress.start();

        let sink = SharedSink::new(sink);
        let head_bytes = collect_validated(head, self.config.validate_content).await?;
        if head_bytes.is_empty() {
            // The store served nothing for the head range; there are no
            // bytes to place.
            sink.flush().await?;
            return Ok(0);
        }
        sink.write_at(0, &head_bytes).await?;
        progress.advance(head_bytes.len() as u64);

        let head_end = offset + head_bytes.len() as u64 - 1;
        if head_end < end {
            let ranges = plan::plan_ranges(head_end + 1, end, self.config.chunk_size)?;
            debug!(ranges = ranges.len(), "fetching remaining sub-ranges");

            let store = self.store.clone();
            let validate = self.config.validate_content;
            let sink_ref = &sink;
            let store_ref = &store;
            executor::drive(
                stream::iter(ranges.into_iter().map(Ok)),
                self.config.max_concurrency,
                &progress,
                |range: RangeDescriptor| async move {
                    let read = store_ref.get_blob(Some(range.into())).await?;
                    check_served_start(range.start, &read)?;
                    let bytes = collect_validated(read, validate).await?;
                    sink_ref.write_at(range.start - offset, &bytes).await?;
                    Ok(ChunkRecord::new(range.start, bytes.len() as u64))
                },
            )
            .await?;
        }

        sink.flush().await?;
        Ok(progress.bytes_done())
    }

    /// Inclusive end of the whole requested window, or `None` when the
    /// object holds no bytes at or past `offset`
    fn resolve_end(
        &self,
        offset: u64,
        length: Option<u64>,
        head: &RemoteRead,
    ) -> TransferResult<Option<u64>> {
        if let Some(len) = length {
            return Ok(Some(offset + len - 1));
        }
        let total = head.total_size.ok_or_else(|| {
            TransferError::invalid("remote did not report a total size for an open-ended read")
        })?;
        if offset >= total {
            return Ok(None);
        }
        Ok(Some(total - 1))
    }
}

/// A lazily consumed download bound to one ranged GET response
pub struct DownloadStream {
    /// Length of the requested range in bytes
    pub size: u64,
    pub etag: Option<String>,
    validate: bool,
    read: RemoteRead,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("size", &self.size)
            .field("etag", &self.etag)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

impl DownloadStream {
    /// Server digest for the returned payload, when one was sent
    pub fn content_digest(&self) -> Option<&ContentDigest> {
        self.read.content_digest.as_ref()
    }

    /// Buffer the whole range, verifying integrity if enabled.
    ///
    /// On a checksum mismatch the bytes have already been received but are
    /// not returned; the error is never silent.
    pub async fn read_all(self) -> TransferResult<Bytes> {
        collect_validated(self.read, self.validate).await
    }

    /// Consume as a raw byte stream.
    ///
    /// With validation enabled the stream digests bytes as they pass and
    /// yields a final error item on mismatch, after the payload has been
    /// delivered; callers must discard the buffer on that error.
    pub fn into_stream(self) -> crate::ByteStream {
        if !self.validate {
            return self.read.stream;
        }
        let Some(expected) = self.read.content_digest else {
            return self.read.stream;
        };

        let mut body = self.read.stream;
        let stream = async_stream::try_stream! {
            let mut received = BytesMut::new();
            while let Some(item) = body.next().await {
                let bytes = item?;
                received.extend_from_slice(&bytes);
                yield bytes;
            }
            expected.verify(&received).map_err(std::io::Error::from)?;
        };
        Box::pin(stream)
    }
}

/// Reject responses whose reported range starts somewhere other than the
/// requested offset; placing them would corrupt the assembled bytes.
fn check_served_start(requested: u64, read: &RemoteRead) -> TransferResult<()> {
    match &read.resolved {
        Some(served) if served.start != requested => Err(TransferError::invalid(format!(
            "remote served range {served} for a request starting at {requested}"
        ))),
        _ => Ok(()),
    }
}

async fn collect_validated(read: RemoteRead, validate: bool) -> TransferResult<Bytes> {
    let mut body = read.stream;
    let mut buffer = BytesMut::new();
    while let Some(item) = body.next().await {
        buffer.extend_from_slice(&item?);
    }
    let bytes = buffer.freeze();

    if validate {
        if let Some(expected) = &read.content_digest {
            expected.verify(&bytes)?;
        }
    }
    Ok(bytes)
}
