use thiserror::Error;

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors that can occur while planning or running a chunked transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid transfer request: {message}")]
    Invalid { message: String },

    #[error("Remote object not found: {context}")]
    NotFound { context: String },

    #[error("Destination already exists and overwrite is disabled")]
    DestinationExists,

    #[error("Precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Remote store error: {source}")]
    Remote {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(context: S) -> Self {
        Self::NotFound {
            context: context.into(),
        }
    }

    /// Create a precondition failure (etag or append-position mismatch)
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Create a remote store error from any error type
    pub fn remote<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Remote {
            source: Box::new(error),
        }
    }

    /// Create a checksum mismatch error from two digests
    pub fn checksum_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// True for the 404-class errors that trigger the append create-and-retry path
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<TransferError> for std::io::Error {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io { source } => source,
            other => std::io::Error::other(other),
        }
    }
}
