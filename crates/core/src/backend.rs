//! Remote object store surface used by `BulkStoreClient`

use async_trait::async_trait;

use crate::error::Result;
use crate::object::{ListMode, ListPage, ObjectIdentity, PageToken};
use crate::transfer::{DownloadSpec, TransferId, TransferStatus, UploadSpec};

/// The remote API the bulk client orchestrates.
///
/// Implementations own transport, signing and retries; the bulk client only
/// sequences these calls.
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    /// Fetch one page of a listing. `token` is `None` for the first page.
    async fn list_page(
        &self,
        bucket: &str,
        mode: ListMode,
        token: Option<PageToken>,
    ) -> Result<ListPage>;

    /// Delete a single object (or a single version when the identity has one)
    async fn delete_object(&self, identity: &ObjectIdentity) -> Result<()>;

    /// Delete a bucket. Fails if the bucket is not empty.
    async fn delete_container(&self, bucket: &str) -> Result<()>;

    /// Start an upload and return immediately
    async fn begin_upload(&self, spec: &UploadSpec) -> Result<TransferId>;

    /// Start a download and return immediately
    async fn begin_download(&self, spec: &DownloadSpec) -> Result<TransferId>;

    /// Current progress of a transfer started by this backend
    async fn query_transfer(&self, id: TransferId) -> Result<TransferStatus>;

    /// Release whatever the backend keeps for a transfer the caller stopped
    /// watching. The transfer itself is not cancelled.
    async fn forget_transfer(&self, _id: TransferId) {}
}
