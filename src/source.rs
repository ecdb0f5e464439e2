use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;

use crate::{ByteStream, ChecksumAlgorithm, ContentDigest, TransferError, TransferResult};

/// One chunk of a logical object, ready for a single remote write.
///
/// Produced lazily by the forward reader or a sub-stream; immutable once
/// produced and discarded after aggregation.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Byte offset of the chunk within the produced sequence
    pub offset: u64,
    pub payload: Bytes,
    /// Digest over `payload`, present when content validation is on
    pub content_digest: Option<ContentDigest>,
}

impl ChunkDescriptor {
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Stateful per-chunk transform, the padding/encryption seam.
///
/// `update` maps each chunk's bytes; `finalize` emits any trailing bytes
/// (padding, cipher finalization) which are appended to the last chunk.
pub trait ChunkTransform: Send {
    fn update(&mut self, input: Bytes) -> Bytes;
    fn finalize(&mut self) -> Bytes;
}

/// Creates a fresh transform instance for each transfer
pub type ChunkTransformFactory = Arc<dyn Fn() -> Box<dyn ChunkTransform> + Send + Sync>;

/// Forward-streaming chunk reader.
///
/// Accumulates a non-seekable byte source into fixed-size chunks, with a
/// (possibly short) final chunk at end-of-stream. The source is consumed
/// destructively; the produced sequence is not restartable.
pub struct ChunkReader {
    body: ByteStream,
    chunk_size: usize,
    buffer: BytesMut,
    offset: u64,
    source_drained: bool,
    finished: bool,
    transform: Option<Box<dyn ChunkTransform>>,
    checksum: Option<ChecksumAlgorithm>,
}

impl ChunkReader {
    pub fn new(body: ByteStream, chunk_size: u64) -> Self {
        Self {
            body,
            chunk_size: chunk_size as usize,
            buffer: BytesMut::new(),
            offset: 0,
            source_drained: false,
            finished: false,
            transform: None,
            checksum: None,
        }
    }

    /// Apply a transform to every produced chunk
    pub fn with_transform(mut self, transform: Box<dyn ChunkTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Attach a digest to every produced chunk
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// Read the next chunk, or `None` at end-of-stream.
    ///
    /// Partial stream items accumulate until a full chunk is assembled, so
    /// chunk boundaries are independent of how the source fragments its
    /// bytes.
    pub async fn next_chunk(&mut self) -> TransferResult<Option<ChunkDescriptor>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            while !self.source_drained && self.buffer.len() < self.chunk_size {
                match self.body.next().await {
                    Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                    Some(Err(err)) => return Err(TransferError::from(err)),
                    None => self.source_drained = true,
                }
            }

            let raw = if self.buffer.len() >= self.chunk_size {
                self.buffer.split_to(self.chunk_size).freeze()
            } else {
                self.finished = true;
                self.buffer.split().freeze()
            };

            let payload = match &mut self.transform {
                Some(transform) => {
                    let mut out = BytesMut::from(transform.update(raw).as_ref());
                    if self.finished {
                        out.extend_from_slice(&transform.finalize());
                    }
                    out.freeze()
                }
                None => raw,
            };

            // A transform may hold a whole chunk back and emit nothing;
            // keep reading until it produces bytes or the source ends.
            if payload.is_empty() {
                if self.finished {
                    return Ok(None);
                }
                continue;
            }

            let chunk = ChunkDescriptor {
                offset: self.offset,
                content_digest: self
                    .checksum
                    .map(|alg| ContentDigest::compute(alg, &payload)),
                payload,
            };
            self.offset += chunk.len();
            return Ok(Some(chunk));
        }
    }

    /// Consume the reader as a fallible chunk stream
    pub fn into_stream(self) -> impl Stream<Item = TransferResult<ChunkDescriptor>> + Send {
        futures_util::stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_chunk().await?.map(|chunk| (chunk, reader)))
        })
    }

    /// Drain the remaining source into a single buffer (single-shot path)
    pub async fn read_to_end(mut self) -> TransferResult<Bytes> {
        let mut all = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            all.extend_from_slice(&chunk.payload);
        }
        Ok(all.freeze())
    }
}
