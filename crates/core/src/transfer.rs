//! Transfer requests, backend status reports and caller-side handles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque identifier of an asynchronous transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transfer: `Pending -> InProgress -> {Completed, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }
}

/// Upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSpec {
    /// One local file to one key
    File {
        bucket: String,
        key: String,
        source: PathBuf,
    },
    /// Every file below `source_dir`, keyed by relative path under `prefix`
    Directory {
        bucket: String,
        prefix: Option<String>,
        source_dir: PathBuf,
    },
}

/// Download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSpec {
    /// One key to one local file
    File {
        bucket: String,
        key: String,
        destination: PathBuf,
    },
    /// Every object under `prefix` (whole bucket when `None`) into `destination_dir`
    Directory {
        bucket: String,
        prefix: Option<String>,
        destination_dir: PathBuf,
    },
}

/// What `BulkStoreClient::start_transfer` should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSpec {
    Upload(UploadSpec),
    Download(DownloadSpec),
}

impl TransferSpec {
    pub fn upload_file(
        bucket: impl Into<String>,
        key: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        TransferSpec::Upload(UploadSpec::File {
            bucket: bucket.into(),
            key: key.into(),
            source: source.into(),
        })
    }

    pub fn upload_directory(
        bucket: impl Into<String>,
        prefix: Option<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        TransferSpec::Upload(UploadSpec::Directory {
            bucket: bucket.into(),
            prefix,
            source_dir: source_dir.into(),
        })
    }

    pub fn download_file(
        bucket: impl Into<String>,
        key: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        TransferSpec::Download(DownloadSpec::File {
            bucket: bucket.into(),
            key: key.into(),
            destination: destination.into(),
        })
    }

    pub fn download_directory(
        bucket: impl Into<String>,
        prefix: Option<String>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        TransferSpec::Download(DownloadSpec::Directory {
            bucket: bucket.into(),
            prefix,
            destination_dir: destination_dir.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        match self {
            TransferSpec::Upload(UploadSpec::File { bucket, .. })
            | TransferSpec::Upload(UploadSpec::Directory { bucket, .. })
            | TransferSpec::Download(DownloadSpec::File { bucket, .. })
            | TransferSpec::Download(DownloadSpec::Directory { bucket, .. }) => bucket,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            TransferSpec::Upload(UploadSpec::Directory { .. })
                | TransferSpec::Download(DownloadSpec::Directory { .. })
        )
    }
}

/// One file of a directory transfer that failed while others succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub key: String,
    pub path: PathBuf,
    pub detail: String,
}

/// What the backend reports when a transfer is queried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStatus {
    pub transferred_bytes: u64,
    pub total_bytes: Option<u64>,
    pub state: TransferState,
    pub failure_detail: Option<String>,
    pub failed_files: Vec<FailedFile>,
}

/// Point-in-time view of a transfer, as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    pub id: TransferId,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub state: TransferState,
    pub failure_detail: Option<String>,
    pub failed_files: Vec<FailedFile>,
}

impl TransferProgress {
    fn pending(id: TransferId) -> Self {
        Self {
            id,
            total_bytes: None,
            transferred_bytes: 0,
            state: TransferState::Pending,
            failure_detail: None,
            failed_files: Vec::new(),
        }
    }

    /// Fold one backend report into this view.
    ///
    /// Byte counts never go backwards and a terminal state is never left.
    pub(crate) fn apply(&mut self, status: TransferStatus) {
        if self.state.is_terminal() {
            return;
        }

        if status.transferred_bytes < self.transferred_bytes {
            tracing::warn!(
                transfer = %self.id,
                reported = status.transferred_bytes,
                seen = self.transferred_bytes,
                "backend reported fewer transferred bytes than before; keeping the higher count"
            );
        }
        self.transferred_bytes = self.transferred_bytes.max(status.transferred_bytes);

        if status.total_bytes.is_some() {
            self.total_bytes = status.total_bytes;
        }
        self.failed_files = status.failed_files;

        self.state = match status.state {
            TransferState::Failed => {
                self.failure_detail = Some(
                    status
                        .failure_detail
                        .unwrap_or_else(|| "transfer failed".to_string()),
                );
                TransferState::Failed
            }
            TransferState::Completed => TransferState::Completed,
            TransferState::Pending | TransferState::InProgress => {
                if self.total_bytes == Some(self.transferred_bytes) {
                    TransferState::Completed
                } else {
                    TransferState::InProgress
                }
            }
        };
    }

    /// Completed fraction in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some(self.transferred_bytes as f64 / total as f64),
            None => None,
        }
    }

    pub fn remaining_bytes(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.transferred_bytes))
    }
}

/// Caller-side handle of a running transfer.
///
/// Only the polling routine in `BulkStoreClient` writes to it; anyone may take
/// a snapshot or subscribe to updates at any time.
#[derive(Debug)]
pub struct TransferHandle {
    id: TransferId,
    spec: TransferSpec,
    progress: watch::Sender<TransferProgress>,
    cancel: CancellationToken,
}

impl TransferHandle {
    pub(crate) fn new(id: TransferId, spec: TransferSpec) -> Self {
        let (progress, _) = watch::channel(TransferProgress::pending(id));
        Self {
            id,
            spec,
            progress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn spec(&self) -> &TransferSpec {
        &self.spec
    }

    pub fn snapshot(&self) -> TransferProgress {
        self.progress.borrow().clone()
    }

    pub fn state(&self) -> TransferState {
        self.progress.borrow().state
    }

    /// Receive every update the polling routine publishes
    pub fn subscribe(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Stop local polling. Best-effort: the backend operation is not halted
    /// and may still complete.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn publish(&self, status: TransferStatus) -> TransferProgress {
        self.progress.send_modify(|p| p.apply(status));
        self.snapshot()
    }
}
