use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{ByteStream, ChunkDescriptor, ChunkPlan, TransferResult};

/// A seekable byte source shared by concurrent sub-streams.
///
/// The raw handle lives behind a lock and is only reachable through
/// [`read_at`], which performs the `seek + read` pair atomically relative to
/// other sub-streams. The lock covers one discrete read, not a sub-stream's
/// whole lifetime, so actual I/O waits overlap across chunks.
///
/// [`read_at`]: SharedSource::read_at
pub struct SharedSource<R> {
    inner: Arc<Mutex<R>>,
    len: u64,
}

impl<R> Clone for SharedSource<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            len: self.len,
        }
    }
}

impl<R> SharedSource<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// Wrap a seekable source, measuring its total length once
    pub async fn new(mut source: R) -> TransferResult<Self> {
        let len = source.seek(SeekFrom::End(0)).await?;
        source.seek(SeekFrom::Start(0)).await?;
        Ok(Self {
            inner: Arc::new(Mutex::new(source)),
            len,
        })
    }

    /// Total length of the underlying source in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Holds the source lock across the `seek + read` pair and nothing else.
    pub async fn read_at(&self, offset: u64, length: u64) -> TransferResult<Bytes> {
        let mut buf = vec![0u8; length as usize];
        {
            let mut source = self.inner.lock().await;
            source.seek(SeekFrom::Start(offset)).await?;
            source.read_exact(&mut buf).await?;
        }
        Ok(buf.into())
    }

    /// Partition the source into deterministic fixed-size windows, the last
    /// one possibly short. No bytes are read until a window is consumed.
    pub fn partition(&self, chunk_size: u64) -> TransferResult<Vec<SubStream<R>>> {
        let plan = ChunkPlan::new(self.len, chunk_size)?;
        Ok(plan
            .map(|boundary| SubStream {
                source: self.clone(),
                offset: boundary.offset,
                length: boundary.length,
            })
            .collect())
    }
}

impl<R> SharedSource<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    /// Consume the source as a sequential byte stream of `chunk_size` reads
    pub fn into_byte_stream(self, chunk_size: u64) -> TransferResult<ByteStream> {
        let plan = ChunkPlan::new(self.len, chunk_size)?;
        let stream = async_stream::try_stream! {
            for boundary in plan {
                let bytes = self
                    .read_at(boundary.offset, boundary.length)
                    .await
                    .map_err(std::io::Error::from)?;
                yield bytes;
            }
        };
        Ok(Box::pin(stream))
    }
}

/// A single-use window over a [`SharedSource`].
///
/// Reads happen at consumption time through the shared lock, never at
/// partition time, and can only observe `[offset, offset + length)`.
pub struct SubStream<R> {
    source: SharedSource<R>,
    offset: u64,
    length: u64,
}

impl<R> SubStream<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Read the whole window into a chunk descriptor
    pub async fn read(self) -> TransferResult<ChunkDescriptor> {
        let payload = self.source.read_at(self.offset, self.length).await?;
        Ok(ChunkDescriptor {
            offset: self.offset,
            payload,
            content_digest: None,
        })
    }
}

/// A seekable byte sink shared by concurrent range writers.
///
/// Mirror of [`SharedSource`]: each `write_at` performs its `seek + write`
/// pair under the lock, so out-of-order completions land at their own
/// absolute offsets without corrupting each other.
pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W> SharedSink<W>
where
    W: AsyncWrite + AsyncSeek + Unpin + Send,
{
    pub fn new(sink: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Write `payload` starting at `offset`
    pub async fn write_at(&self, offset: u64, payload: &[u8]) -> TransferResult<()> {
        let mut sink = self.inner.lock().await;
        sink.seek(SeekFrom::Start(offset)).await?;
        sink.write_all(payload).await?;
        Ok(())
    }

    /// Flush the underlying sink
    pub async fn flush(&self) -> TransferResult<()> {
        let mut sink = self.inner.lock().await;
        sink.flush().await?;
        Ok(())
    }
}
