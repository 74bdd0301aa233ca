//! bulkstore-core - bulk operations over S3-compatible object stores
//!
//! The [`BulkStoreClient`] enumerates paginated buckets, empties them with
//! per-object failure accounting, and tracks asynchronous transfers to
//! completion. It talks to storage through the [`ObjectStoreBackend`] trait;
//! [`S3Backend`] implements it over the AWS S3 SDK and also carries the
//! single-call bucket, object, tagging and presigned URL operations.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod object;
pub mod presigned;
pub mod s3;
pub mod transfer;

// Re-export commonly used types
pub use backend::ObjectStoreBackend;
pub use client::BulkStoreClient;
pub use config::{
    config_exists, get_config_path, load_config, load_config_from, save_config, save_config_to,
    validate_config,
};
pub use config::{ConfigFile, LoggingConfig, PresignConfig, StorageConfig, TransferConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use object::{BatchDeleteResult, DeleteOutcome, ListMode, ListPage, ObjectIdentity, PageToken};
pub use presigned::{PresignedMethod, PresignedUrl, PresignedUrlConfig};
pub use s3::{BucketInfo, ObjectMetadata, PutOptions, S3Backend};
pub use transfer::{
    DownloadSpec, FailedFile, TransferHandle, TransferId, TransferProgress, TransferSpec,
    TransferState, TransferStatus, UploadSpec,
};
