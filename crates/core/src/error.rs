//! Error types for bulkstore-core

use std::path::PathBuf;
use thiserror::Error;

use crate::transfer::TransferId;

/// Result type alias for bulkstore-core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bulkstore-core
#[derive(Error, Debug)]
pub enum Error {
    /// A listing page could not be fetched
    #[error("Enumeration of '{container}' failed: {detail}")]
    EnumerationFailed { container: String, detail: String },

    /// A single object delete failed
    #[error("Delete of '{key}' failed: {detail}")]
    DeleteFailed { key: String, detail: String },

    /// Polling exceeded the caller's bound; the transfer may still complete
    #[error("Transfer {0} did not finish within the allotted time")]
    TransferTimedOut(TransferId),

    /// Backend reported a terminal transfer failure
    #[error("Transfer {id} failed: {detail}")]
    TransferFailed { id: TransferId, detail: String },

    /// Local polling was stopped by the caller
    #[error("Transfer {0} was abandoned")]
    TransferAbandoned(TransferId),

    /// Backend has no record of the transfer
    #[error("Unknown transfer: {0}")]
    UnknownTransfer(TransferId),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidConfig(String),

    /// S3 operation errors
    #[error("S3 operation failed: {0}")]
    S3Operation(String),

    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// Presigned URL could not be built
    #[error("Presigned URL error: {0}")]
    Presign(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<aws_sdk_s3::Error> for Error {
    fn from(err: aws_sdk_s3::Error) -> Self {
        Error::AwsSdk(err.to_string())
    }
}

// Generic SdkError conversion for all S3 operations
impl<E> From<aws_sdk_s3::error::SdkError<E>> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: aws_sdk_s3::error::SdkError<E>) -> Self {
        // DisplayErrorContext walks the source chain; the bare Display is just "service error"
        Error::S3Operation(aws_sdk_s3::error::DisplayErrorContext(&err).to_string())
    }
}

impl From<aws_sdk_s3::primitives::ByteStreamError> for Error {
    fn from(err: aws_sdk_s3::primitives::ByteStreamError) -> Self {
        Error::S3Operation(err.to_string())
    }
}

impl From<aws_sdk_s3::presigning::PresigningConfigError> for Error {
    fn from(err: aws_sdk_s3::presigning::PresigningConfigError) -> Self {
        Error::Presign(err.to_string())
    }
}

impl From<aws_sdk_s3::error::BuildError> for Error {
    fn from(err: aws_sdk_s3::error::BuildError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_failed_message() {
        let err = Error::EnumerationFailed {
            container: "photos".to_string(),
            detail: "page 2 unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Enumeration of 'photos' failed: page 2 unavailable"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
