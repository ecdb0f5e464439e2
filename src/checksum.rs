use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::{TransferError, TransferResult};

const CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_XZ);

/// Digest algorithm used for chunk validation and download integrity checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    Md5,
    Crc64,
}

/// A content digest computed over a byte buffer.
///
/// The remote store may return either variant alongside a ranged read; the
/// downloader compares whichever it received against a locally computed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDigest {
    Md5([u8; 16]),
    Crc64(u64),
}

impl ContentDigest {
    /// Compute a digest over `data` with the given algorithm
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => {
                let digest = Md5::digest(data);
                Self::Md5(digest.into())
            }
            ChecksumAlgorithm::Crc64 => Self::Crc64(CRC64.checksum(data)),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Self::Md5(_) => ChecksumAlgorithm::Md5,
            Self::Crc64(_) => ChecksumAlgorithm::Crc64,
        }
    }

    /// Hex-encoded digest value, for error messages and receipts
    pub fn to_hex(&self) -> String {
        match self {
            Self::Md5(bytes) => hex::encode(bytes),
            Self::Crc64(value) => hex::encode(value.to_be_bytes()),
        }
    }

    /// Recompute this digest's algorithm over `data` and fail on mismatch
    pub fn verify(&self, data: &[u8]) -> TransferResult<()> {
        let actual = Self::compute(self.algorithm(), data);
        if actual != *self {
            return Err(TransferError::checksum_mismatch(
                self.to_hex(),
                actual.to_hex(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
