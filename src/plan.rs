use serde::{Deserialize, Serialize};

use crate::{TransferError, TransferResult};

/// Boundaries of one chunk within a logical object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBoundary {
    /// Byte offset of the chunk start
    pub offset: u64,
    /// Chunk length in bytes; equals the plan's chunk size except possibly
    /// for the final chunk
    pub length: u64,
}

/// Deterministic chunk layout for an object of known size.
///
/// Purely a function of `(total_size, chunk_size)`, no I/O. A zero-length
/// object yields an empty plan; callers special-case the zero-length write.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    next_offset: u64,
}

impl ChunkPlan {
    pub fn new(total_size: u64, chunk_size: u64) -> TransferResult<Self> {
        if chunk_size == 0 {
            return Err(TransferError::invalid("chunk size must be positive"));
        }
        Ok(Self {
            total_size,
            chunk_size,
            next_offset: 0,
        })
    }

    /// Number of chunks in the plan: `ceil(total_size / chunk_size)`
    pub fn chunk_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkBoundary;

    fn next(&mut self) -> Option<ChunkBoundary> {
        if self.next_offset >= self.total_size {
            return None;
        }
        let offset = self.next_offset;
        let length = self.chunk_size.min(self.total_size - offset);
        self.next_offset = offset + length;
        Some(ChunkBoundary { offset, length })
    }
}

/// A byte range request with inclusive start and optional inclusive end.
///
/// `end == None` means "to the end of the object", matching an open-ended
/// HTTP range header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Build the range for a `(offset, length)` download request.
    ///
    /// `length = Some(50)` at `offset = 100` requests bytes `100-149`
    /// inclusive.
    pub fn for_request(offset: u64, length: Option<u64>) -> TransferResult<Self> {
        let end = match length {
            Some(0) => return Err(TransferError::invalid("download length must be positive")),
            Some(len) => Some(offset + len - 1),
            None => None,
        };
        Ok(Self { start: offset, end })
    }
}

impl From<RangeDescriptor> for ByteRange {
    fn from(range: RangeDescriptor) -> Self {
        Self {
            start: range.start,
            end: Some(range.end),
        }
    }
}

/// A concrete planned sub-range with inclusive bounds, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub start: u64,
    pub end: u64,
}

impl RangeDescriptor {
    pub fn new(start: u64, end: u64) -> TransferResult<Self> {
        if end < start {
            return Err(TransferError::invalid(format!(
                "invalid range: {start}-{end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of bytes covered; inclusive bounds, so never zero
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl std::fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Split the inclusive window `[start, end]` into sub-ranges no larger than
/// `max_range` bytes, in ascending offset order.
pub fn plan_ranges(start: u64, end: u64, max_range: u64) -> TransferResult<Vec<RangeDescriptor>> {
    if max_range == 0 {
        return Err(TransferError::invalid("range size must be positive"));
    }
    if end < start {
        return Err(TransferError::invalid(format!(
            "invalid range: {start}-{end}"
        )));
    }

    let mut ranges = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let stop = end.min(cursor + max_range - 1);
        ranges.push(RangeDescriptor {
            start: cursor,
            end: stop,
        });
        cursor = stop + 1;
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_splits_with_short_final_chunk() {
        let plan = ChunkPlan::new(10_000_000, 4_000_000).unwrap();
        assert_eq!(plan.chunk_count(), 3);

        let chunks: Vec<ChunkBoundary> = plan.collect();
        assert_eq!(
            chunks,
            vec![
                ChunkBoundary {
                    offset: 0,
                    length: 4_000_000
                },
                ChunkBoundary {
                    offset: 4_000_000,
                    length: 4_000_000
                },
                ChunkBoundary {
                    offset: 8_000_000,
                    length: 2_000_000
                },
            ]
        );
    }

    #[test]
    fn test_zero_size_yields_empty_plan() {
        let plan = ChunkPlan::new(0, 1024).unwrap();
        assert_eq!(plan.chunk_count(), 0);
        assert_eq!(plan.count(), 0);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(ChunkPlan::new(100, 0).is_err());
    }

    #[test]
    fn test_request_range_is_inclusive() {
        let range = ByteRange::for_request(100, Some(50)).unwrap();
        assert_eq!(range.start, 100);
        assert_eq!(range.end, Some(149));

        let open = ByteRange::for_request(100, None).unwrap();
        assert_eq!(open.end, None);
    }

    #[test]
    fn test_plan_ranges_splits_inclusive_window() {
        let ranges = plan_ranges(0, 9, 4).unwrap();
        assert_eq!(
            ranges,
            vec![
                RangeDescriptor { start: 0, end: 3 },
                RangeDescriptor { start: 4, end: 7 },
                RangeDescriptor { start: 8, end: 9 },
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_chunk_plan_covers_object(
            total_size in 1u64..50_000,
            chunk_size in 1u64..5_000,
        ) {
            let plan = ChunkPlan::new(total_size, chunk_size).unwrap();
            let count = plan.chunk_count();
            let chunks: Vec<ChunkBoundary> = plan.collect();

            prop_assert_eq!(count, total_size.div_ceil(chunk_size));
            prop_assert_eq!(chunks.len() as u64, count);

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.offset, i as u64 * chunk_size);
                if (i as u64) < count - 1 {
                    prop_assert_eq!(chunk.length, chunk_size);
                }
            }

            let last = chunks.last().unwrap();
            prop_assert!(last.length >= 1 && last.length <= chunk_size);
            prop_assert_eq!(last.offset + last.length, total_size);
        }

        #[test]
        fn prop_planned_ranges_are_contiguous(
            start in 0u64..10_000,
            len in 1u64..20_000,
            max_range in 1u64..3_000,
        ) {
            let end = start + len - 1;
            let ranges = plan_ranges(start, end, max_range).unwrap();

            prop_assert_eq!(ranges.first().unwrap().start, start);
            prop_assert_eq!(ranges.last().unwrap().end, end);
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].end + 1, pair[1].start);
            }
            for range in &ranges {
                prop_assert!(range.len() <= max_range);
            }
        }
    }
}
