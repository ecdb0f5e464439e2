#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use parking_lot::Mutex;

use lodestream::{
    AppendReceipt, ByteRange, ChecksumAlgorithm, ContentDigest, RangeDescriptor, RemoteBlobStore,
    RemoteRead, TransferError, TransferResult, WriteConditions, WriteReceipt,
};

/// One recorded remote call, for asserting engine behavior
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    PutBlob { size: u64 },
    StageBlock { block_id: String, size: u64 },
    CommitBlockList { block_ids: Vec<String> },
    CreatePageBlob { size: u64 },
    UploadPages {
        range: RangeDescriptor,
        conditions: WriteConditions,
    },
    CreateAppendBlob,
    AppendBlock {
        size: u64,
        conditions: WriteConditions,
    },
    GetBlob { range: Option<ByteRange> },
}

/// In-memory remote store double with call recording and fault injection
pub struct MockStore {
    calls: Mutex<Vec<StoreCall>>,
    staged: Mutex<BTreeMap<String, Bytes>>,
    committed: Mutex<Vec<u8>>,
    pages: Mutex<Vec<u8>>,
    append: Mutex<Option<Vec<u8>>>,
    blob: Vec<u8>,
    etag_counter: AtomicU64,
    current_etag: Mutex<Option<String>>,
    exists: AtomicBool,
    digest_algorithm: Option<ChecksumAlgorithm>,
    corrupt_digest: bool,
    stage_delays: Mutex<BTreeMap<u64, Duration>>,
    skew_append_offset: AtomicBool,
    serve_empty_reads: AtomicBool,
    shift_served_ranges: AtomicBool,
    append_delays: Mutex<Vec<Duration>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            staged: Mutex::new(BTreeMap::new()),
            committed: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
            append: Mutex::new(Some(Vec::new())),
            blob: Vec::new(),
            etag_counter: AtomicU64::new(0),
            current_etag: Mutex::new(None),
            exists: AtomicBool::new(false),
            digest_algorithm: None,
            corrupt_digest: false,
            stage_delays: Mutex::new(BTreeMap::new()),
            skew_append_offset: AtomicBool::new(false),
            serve_empty_reads: AtomicBool::new(false),
            shift_served_ranges: AtomicBool::new(false),
            append_delays: Mutex::new(Vec::new()),
        }
    }

    /// Content served by `get_blob`
    pub fn with_blob(mut self, data: Vec<u8>) -> Self {
        self.blob = data;
        self
    }

    /// Attach server digests to ranged reads
    pub fn with_digests(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.digest_algorithm = Some(algorithm);
        self
    }

    /// Serve digests that never match the payload
    pub fn with_corrupt_digests(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.digest_algorithm = Some(algorithm);
        self.corrupt_digest = true;
        self
    }

    /// Make the first append fail with NotFound until a create call lands
    pub fn with_missing_append_target(self) -> Self {
        *self.append.lock() = None;
        self
    }

    /// Report append offsets that disagree with the blob's committed
    /// length, so chained position conditions fail
    pub fn with_skewed_append_offsets(self) -> Self {
        self.skew_append_offset.store(true, Ordering::SeqCst);
        self
    }

    /// Serve successful reads with an empty body
    pub fn with_empty_reads(self) -> Self {
        self.serve_empty_reads.store(true, Ordering::SeqCst);
        self
    }

    /// Report served ranges one byte past where they were requested
    pub fn with_shifted_served_ranges(self) -> Self {
        self.shift_served_ranges.store(true, Ordering::SeqCst);
        self
    }

    /// Delay append calls, one entry per call in arrival order, so chunk
    /// completions overtake each other
    pub fn with_append_delays(self, delays: Vec<Duration>) -> Self {
        *self.append_delays.lock() = delays;
        self
    }

    /// Pretend the destination blob already exists
    pub fn with_existing_destination(self) -> Self {
        self.exists.store(true, Ordering::SeqCst);
        self
    }

    /// Delay the stage call for the chunk at `offset`, to scramble
    /// completion order
    pub fn with_stage_delay(self, offset: u64, delay: Duration) -> Self {
        self.stage_delays.lock().insert(offset, delay);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn committed(&self) -> Vec<u8> {
        self.committed.lock().clone()
    }

    pub fn page_contents(&self) -> Vec<u8> {
        self.pages.lock().clone()
    }

    pub fn append_contents(&self) -> Vec<u8> {
        self.append.lock().clone().unwrap_or_default()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn next_etag(&self) -> String {
        format!("etag-{}", self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn write_receipt(&self) -> WriteReceipt {
        let etag = self.next_etag();
        *self.current_etag.lock() = Some(etag.clone());
        WriteReceipt {
            etag: Some(etag),
            last_modified: Some(1_700_000_000),
        }
    }

    fn check_overwrite(&self, overwrite: bool) -> TransferResult<()> {
        if !overwrite && self.exists.load(Ordering::SeqCst) {
            return Err(TransferError::DestinationExists);
        }
        Ok(())
    }

    fn served_digest(&self, payload: &[u8]) -> Option<ContentDigest> {
        let algorithm = self.digest_algorithm?;
        if self.corrupt_digest {
            let mut corrupted = payload.to_vec();
            corrupted.push(0xFF);
            Some(ContentDigest::compute(algorithm, &corrupted))
        } else {
            Some(ContentDigest::compute(algorithm, payload))
        }
    }
}

/// Decode the chunk offset back out of a block id
pub fn offset_of_block_id(block_id: &str) -> u64 {
    let decoded = BASE64.decode(block_id).expect("block id is base64");
    String::from_utf8(decoded)
        .expect("block id decodes to text")
        .parse()
        .expect("block id encodes an offset")
}

#[async_trait]
impl RemoteBlobStore for MockStore {
    async fn put_blob(&self, payload: Bytes, overwrite: bool) -> TransferResult<WriteReceipt> {
        self.check_overwrite(overwrite)?;
        self.record(StoreCall::PutBlob {
            size: payload.len() as u64,
        });
        *self.committed.lock() = payload.to_vec();
        Ok(self.write_receipt())
    }

    async fn stage_block(&self, block_id: &str, payload: Bytes) -> TransferResult<()> {
        let delay = self
            .stage_delays
            .lock()
            .get(&offset_of_block_id(block_id))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.record(StoreCall::StageBlock {
            block_id: block_id.to_string(),
            size: payload.len() as u64,
        });
        self.staged.lock().insert(block_id.to_string(), payload);
        Ok(())
    }

    async fn commit_block_list(
        &self,
        block_ids: Vec<String>,
        overwrite: bool,
    ) -> TransferResult<WriteReceipt> {
        self.check_overwrite(overwrite)?;
        self.record(StoreCall::CommitBlockList {
            block_ids: block_ids.clone(),
        });

        let staged = self.staged.lock();
        let mut assembled = Vec::new();
        for id in &block_ids {
            let block = staged
                .get(id)
                .ok_or_else(|| TransferError::invalid(format!("unknown block id {id}")))?;
            assembled.extend_from_slice(block);
        }
        *self.committed.lock() = assembled;
        Ok(self.write_receipt())
    }

    async fn create_page_blob(&self, size: u64, overwrite: bool) -> TransferResult<WriteReceipt> {
        self.check_overwrite(overwrite)?;
        self.record(StoreCall::CreatePageBlob { size });
        *self.pages.lock() = vec![0u8; size as usize];
        Ok(self.write_receipt())
    }

    async fn upload_pages(
        &self,
        range: RangeDescriptor,
        payload: Bytes,
        conditions: WriteConditions,
    ) -> TransferResult<WriteReceipt> {
        self.record(StoreCall::UploadPages {
            range,
            conditions: conditions.clone(),
        });

        if let Some(expected) = &conditions.if_match {
            let current = self.current_etag.lock().clone();
            if current.as_deref() != Some(expected.as_str()) {
                return Err(TransferError::precondition(format!(
                    "etag mismatch: expected {expected}, have {current:?}"
                )));
            }
        }

        let mut pages = self.pages.lock();
        let start = range.start as usize;
        let end = range.end as usize;
        if end >= pages.len() {
            return Err(TransferError::invalid("page range past end of blob"));
        }
        pages[start..=end].copy_from_slice(&payload);
        drop(pages);
        Ok(self.write_receipt())
    }

    async fn create_append_blob(&self) -> TransferResult<WriteReceipt> {
        self.record(StoreCall::CreateAppendBlob);
        let mut append = self.append.lock();
        if append.is_none() {
            *append = Some(Vec::new());
        }
        drop(append);
        Ok(self.write_receipt())
    }

    async fn append_block(
        &self,
        payload: Bytes,
        conditions: WriteConditions,
    ) -> TransferResult<AppendReceipt> {
        let delay = {
            let mut delays = self.append_delays.lock();
            if delays.is_empty() {
                None
            } else {
                Some(delays.remove(0))
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.record(StoreCall::AppendBlock {
            size: payload.len() as u64,
            conditions: conditions.clone(),
        });

        let mut append = self.append.lock();
        let contents = append
            .as_mut()
            .ok_or_else(|| TransferError::not_found("append blob"))?;

        let committed_len = contents.len() as u64;
        if let Some(position) = conditions.append_position {
            if position != committed_len {
                return Err(TransferError::precondition(format!(
                    "append position {position} != committed length {committed_len}"
                )));
            }
        }
        contents.extend_from_slice(&payload);
        drop(append);

        let reported = if self.skew_append_offset.load(Ordering::SeqCst) {
            committed_len + 7
        } else {
            committed_len
        };
        Ok(AppendReceipt {
            receipt: self.write_receipt(),
            append_offset: reported,
        })
    }

    async fn get_blob(&self, range: Option<ByteRange>) -> TransferResult<RemoteRead> {
        self.record(StoreCall::GetBlob { range });

        let total = self.blob.len() as u64;
        if self.serve_empty_reads.load(Ordering::SeqCst) {
            return Ok(RemoteRead {
                size: 0,
                total_size: Some(total),
                etag: self.current_etag.lock().clone(),
                content_digest: None,
                resolved: None,
                stream: Box::pin(futures::stream::empty()),
            });
        }
        let (start, end) = match range {
            Some(r) => {
                if r.start >= total {
                    return Err(TransferError::invalid(format!(
                        "range start {} past end of {total}-byte blob",
                        r.start
                    )));
                }
                (r.start, r.end.map_or(total - 1, |e| e.min(total - 1)))
            }
            None => {
                if total == 0 {
                    (0, 0)
                } else {
                    (0, total - 1)
                }
            }
        };

        let payload = if total == 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&self.blob[start as usize..=end as usize])
        };

        Ok(RemoteRead {
            size: payload.len() as u64,
            total_size: Some(total),
            etag: self.current_etag.lock().clone(),
            content_digest: self.served_digest(&payload),
            resolved: if payload.is_empty() {
                None
            } else if self.shift_served_ranges.load(Ordering::SeqCst) {
                Some(RangeDescriptor {
                    start: start + 1,
                    end: end + 1,
                })
            } else {
                Some(RangeDescriptor { start, end })
            },
            stream: Box::pin(futures::stream::once(async move { Ok(payload) })),
        })
    }
}
