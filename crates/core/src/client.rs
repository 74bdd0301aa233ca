//! Bulk operations over an object store backend: enumerate, empty, remove,
//! and progress-tracked transfers.

use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::ObjectStoreBackend;
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::object::{BatchDeleteResult, DeleteOutcome, ListMode, ObjectIdentity};
use crate::transfer::{
    TransferHandle, TransferId, TransferProgress, TransferSpec, TransferState,
};

/// Orchestrates multi-object enumeration, continue-on-failure deletion and
/// transfer polling over a single long-lived backend.
pub struct BulkStoreClient<B> {
    backend: B,
    poll_interval: Duration,
    timeout: Duration,
}

impl<B: ObjectStoreBackend> BulkStoreClient<B> {
    /// Create a client with the default transfer polling settings
    pub fn new(backend: B) -> Self {
        Self::with_transfer_config(backend, &TransferConfig::default())
    }

    pub fn with_transfer_config(backend: B, config: &TransferConfig) -> Self {
        Self {
            backend,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    /// Access the backend for single-call operations
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Lazily list every object (or every version) in `bucket`.
    ///
    /// Pages are fetched on demand and flattened in backend order. A failed
    /// page fetch ends the stream with `Error::EnumerationFailed`. Calling
    /// again starts over from the first page.
    pub fn enumerate<'a>(
        &'a self,
        bucket: &'a str,
        mode: ListMode,
    ) -> BoxStream<'a, Result<ObjectIdentity>> {
        Box::pin(async_stream::try_stream! {
            let mut token = None;
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                let requested = token.clone();
                let page = self
                    .backend
                    .list_page(bucket, mode, token.take())
                    .await
                    .map_err(|e| Error::EnumerationFailed {
                        container: bucket.to_string(),
                        detail: format!("page {}: {}", page_number, e),
                    })?;

                debug!(
                    bucket,
                    page = page_number,
                    items = page.items.len(),
                    "fetched listing page"
                );

                for identity in page.items {
                    yield identity;
                }

                match page.next {
                    Some(next) if requested.as_ref() == Some(&next) => {
                        Err::<(), _>(Error::EnumerationFailed {
                            container: bucket.to_string(),
                            detail: format!(
                                "page {}: backend returned the same continuation token twice",
                                page_number
                            ),
                        })?;
                    }
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        })
    }

    /// Delete every enumerated object, one at a time, in listing order.
    ///
    /// A failed delete is recorded and the batch moves on. If the listing
    /// itself fails, the objects seen so far have still been attempted and
    /// the result carries the enumeration error.
    pub async fn delete_all(&self, bucket: &str, mode: ListMode) -> BatchDeleteResult {
        let mut result = BatchDeleteResult::default();
        let mut objects = self.enumerate(bucket, mode);

        while let Some(item) = objects.next().await {
            let identity = match item {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(bucket, error = %e, "listing stopped early; batch is incomplete");
                    result.set_enumeration_error(e.to_string());
                    break;
                }
            };

            let outcome = match self.backend.delete_object(&identity).await {
                Ok(()) => {
                    debug!(object = %identity, "deleted");
                    DeleteOutcome::success(identity)
                }
                Err(e) => {
                    let failure = Error::DeleteFailed {
                        key: identity.key().to_string(),
                        detail: e.to_string(),
                    };
                    warn!(object = %identity, error = %failure, "delete failed");
                    DeleteOutcome::failure(identity, failure.to_string())
                }
            };
            result.record(outcome);
        }

        info!(
            bucket,
            attempted = result.attempted().len(),
            failed = result.failed_count(),
            complete = result.all_succeeded(),
            "batch delete finished"
        );
        result
    }

    /// Delete `bucket` itself. Returns whether the backend accepted it.
    pub async fn remove_container_if_empty(&self, bucket: &str) -> bool {
        match self.backend.delete_container(bucket).await {
            Ok(()) => {
                info!(bucket, "bucket deleted");
                true
            }
            Err(e) => {
                warn!(bucket, error = %e, "bucket delete failed");
                false
            }
        }
    }

    /// Empty `bucket` and, only if every delete succeeded, remove it
    pub async fn empty_and_remove(
        &self,
        bucket: &str,
        mode: ListMode,
    ) -> (BatchDeleteResult, bool) {
        let result = self.delete_all(bucket, mode).await;
        if !result.all_succeeded() {
            warn!(
                bucket,
                failed = result.failed_count(),
                "bucket not removed: some objects remain"
            );
            return (result, false);
        }
        let removed = self.remove_container_if_empty(bucket).await;
        (result, removed)
    }

    /// Start an upload or download and return a `Pending` handle right away
    pub async fn start_transfer(&self, spec: TransferSpec) -> Result<TransferHandle> {
        let id = match &spec {
            TransferSpec::Upload(upload) => self.backend.begin_upload(upload).await?,
            TransferSpec::Download(download) => self.backend.begin_download(download).await?,
        };
        info!(transfer = %id, bucket = spec.bucket(), "transfer started");
        Ok(TransferHandle::new(id, spec))
    }

    /// Poll with the configured interval and timeout
    pub async fn await_transfer(&self, handle: &TransferHandle) -> Result<TransferProgress> {
        self.await_progress(handle, self.poll_interval, self.timeout)
            .await
    }

    /// Poll the backend until the transfer reaches a terminal state.
    ///
    /// Each tick queries first and sleeps `poll_interval` only if the transfer
    /// is still running. Returns the completed snapshot, `TransferFailed` on a
    /// terminal error, `TransferTimedOut` once `timeout` has elapsed (the
    /// backend operation keeps running and the handle stays usable), or
    /// `TransferAbandoned` if the handle was abandoned.
    pub async fn await_progress(
        &self,
        handle: &TransferHandle,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TransferProgress> {
        if poll_interval.is_zero() {
            return Err(Error::InvalidInput(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let id = handle.id();
        let deadline = Instant::now() + timeout;
        let mut snapshot = handle.snapshot();

        loop {
            if !snapshot.state.is_terminal() {
                if handle.is_abandoned() {
                    return Err(self.abandoned(id).await);
                }
                let status = self.backend.query_transfer(id).await?;
                snapshot = handle.publish(status);
                debug!(
                    transfer = %id,
                    transferred = snapshot.transferred_bytes,
                    total = ?snapshot.total_bytes,
                    state = ?snapshot.state,
                    "polled transfer"
                );
            }

            match snapshot.state {
                TransferState::Completed => {
                    if !snapshot.failed_files.is_empty() {
                        warn!(
                            transfer = %id,
                            failed = snapshot.failed_files.len(),
                            "transfer completed with failed files"
                        );
                    }
                    info!(transfer = %id, bytes = snapshot.transferred_bytes, "transfer completed");
                    return Ok(snapshot);
                }
                TransferState::Failed => {
                    let detail = snapshot
                        .failure_detail
                        .clone()
                        .unwrap_or_else(|| "transfer failed".to_string());
                    warn!(transfer = %id, detail = %detail, "transfer failed");
                    return Err(Error::TransferFailed { id, detail });
                }
                TransferState::Pending | TransferState::InProgress => {}
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(transfer = %id, "stopped waiting for transfer");
                return Err(Error::TransferTimedOut(id));
            }

            tokio::select! {
                _ = handle.cancellation().cancelled() => {
                    return Err(self.abandoned(id).await);
                }
                _ = tokio::time::sleep(poll_interval.min(deadline - now)) => {}
            }
        }
    }

    async fn abandoned(&self, id: TransferId) -> Error {
        info!(transfer = %id, "transfer abandoned; no longer tracked");
        self.backend.forget_transfer(id).await;
        Error::TransferAbandoned(id)
    }
}
