//! Background upload/download tasks and the registry they report into

use aws_sdk_s3::{
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use walkdir::WalkDir;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::transfer::{
    DownloadSpec, FailedFile, TransferId, TransferState, TransferStatus, UploadSpec,
};

/// How long a finished transfer stays queryable when nobody reads its outcome
const FINISHED_RETENTION: Duration = Duration::from_secs(600);

struct Entry {
    status: TransferStatus,
    finished_at: Option<Instant>,
}

impl Entry {
    /// Status as reported to callers.
    ///
    /// Until the task has finished, the byte count is held below the total so
    /// the report can never read as complete. A zero total is withheld for
    /// the same reason.
    fn report(&self) -> TransferStatus {
        let mut status = self.status.clone();
        if self.finished_at.is_none() {
            match status.total_bytes {
                Some(0) => status.total_bytes = None,
                Some(total) => {
                    status.transferred_bytes = status.transferred_bytes.min(total - 1)
                }
                None => {}
            }
        }
        status
    }
}

/// Status of every transfer this backend started and nobody has yet seen finish
#[derive(Clone)]
pub(super) struct TransferRegistry {
    inner: Arc<RwLock<HashMap<TransferId, Entry>>>,
    retention: Duration,
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::with_retention(FINISHED_RETENTION)
    }
}

impl TransferRegistry {
    pub(super) fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub(super) async fn register(&self) -> Tracker {
        let id = TransferId::new();
        let mut transfers = self.inner.write().await;
        self.evict_expired(&mut transfers);
        transfers.insert(
            id,
            Entry {
                status: TransferStatus::default(),
                finished_at: None,
            },
        );
        Tracker {
            id,
            registry: self.clone(),
        }
    }

    /// Read a transfer's status. A terminal status is handed out once, then
    /// the entry is dropped.
    pub(super) async fn observe(&self, id: TransferId) -> Option<TransferStatus> {
        let mut transfers = self.inner.write().await;
        self.evict_expired(&mut transfers);
        let entry = transfers.get(&id)?;
        let status = entry.report();
        if entry.finished_at.is_some() {
            transfers.remove(&id);
        }
        Some(status)
    }

    /// Drop a transfer nobody will query again. A still running task keeps
    /// going but its updates are discarded.
    pub(super) async fn forget(&self, id: TransferId) {
        self.inner.write().await.remove(&id);
    }

    #[cfg(test)]
    pub(super) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    fn evict_expired(&self, transfers: &mut HashMap<TransferId, Entry>) {
        let before = transfers.len();
        transfers.retain(|_, entry| {
            entry
                .finished_at
                .map_or(true, |at| at.elapsed() < self.retention)
        });
        let evicted = before - transfers.len();
        if evicted > 0 {
            debug!(evicted, "dropped unobserved finished transfers");
        }
    }

    async fn update(&self, id: TransferId, f: impl FnOnce(&mut TransferStatus)) {
        if let Some(entry) = self.inner.write().await.get_mut(&id) {
            f(&mut entry.status);
        }
    }

    async fn mark_finished(&self, id: TransferId, f: impl FnOnce(&mut TransferStatus)) {
        if let Some(entry) = self.inner.write().await.get_mut(&id) {
            f(&mut entry.status);
            entry.finished_at = Some(Instant::now());
        }
    }
}

/// Write side of one registry entry, owned by the transfer task
pub(super) struct Tracker {
    id: TransferId,
    registry: TransferRegistry,
}

impl Tracker {
    pub(super) fn id(&self) -> TransferId {
        self.id
    }

    async fn set_total(&self, total: u64) {
        self.registry
            .update(self.id, |s| {
                s.total_bytes = Some(total);
                s.state = TransferState::InProgress;
            })
            .await;
    }

    async fn set_transferred(&self, bytes: u64) {
        self.registry
            .update(self.id, |s| {
                s.transferred_bytes = s.transferred_bytes.max(bytes);
                s.state = TransferState::InProgress;
            })
            .await;
    }

    async fn add(&self, bytes: u64) {
        self.registry
            .update(self.id, |s| s.transferred_bytes += bytes)
            .await;
    }

    async fn file_failed(&self, failed: FailedFile) {
        self.registry
            .update(self.id, |s| s.failed_files.push(failed))
            .await;
    }

    async fn finish(&self, result: Result<()>) {
        self.registry
            .mark_finished(self.id, |s| match result {
                Ok(()) => s.state = TransferState::Completed,
                Err(e) => {
                    s.state = TransferState::Failed;
                    s.failure_detail = Some(e.to_string());
                }
            })
            .await;
    }
}

pub(super) fn spawn_upload(
    client: Client,
    config: TransferConfig,
    spec: UploadSpec,
    tracker: Tracker,
) {
    let span = info_span!("upload", transfer = %tracker.id());
    tokio::spawn(
        async move {
            let result = match &spec {
                UploadSpec::File { bucket, key, source } => {
                    upload_file(&client, &config, bucket, key, source, &tracker).await
                }
                UploadSpec::Directory {
                    bucket,
                    prefix,
                    source_dir,
                } => {
                    upload_directory(
                        &client,
                        &config,
                        bucket,
                        prefix.as_deref(),
                        source_dir,
                        &tracker,
                    )
                    .await
                }
            };
            if let Err(e) = &result {
                warn!(error = %e, "upload failed");
            }
            tracker.finish(result).await;
        }
        .instrument(span),
    );
}

pub(super) fn spawn_download(client: Client, spec: DownloadSpec, tracker: Tracker) {
    let span = info_span!("download", transfer = %tracker.id());
    tokio::spawn(
        async move {
            let result = match &spec {
                DownloadSpec::File {
                    bucket,
                    key,
                    destination,
                } => download_file(&client, bucket, key, destination, &tracker).await,
                DownloadSpec::Directory {
                    bucket,
                    prefix,
                    destination_dir,
                } => {
                    download_directory(
                        &client,
                        bucket,
                        prefix.as_deref(),
                        destination_dir,
                        &tracker,
                    )
                    .await
                }
            };
            if let Err(e) = &result {
                warn!(error = %e, "download failed");
            }
            tracker.finish(result).await;
        }
        .instrument(span),
    );
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

async fn upload_file(
    client: &Client,
    config: &TransferConfig,
    bucket: &str,
    key: &str,
    source: &Path,
    tracker: &Tracker,
) -> Result<()> {
    let size = tokio::fs::metadata(source).await?.len();
    tracker.set_total(size).await;
    send_file(client, config, bucket, key, source, size, Some(tracker)).await?;
    tracker.set_transferred(size).await;
    Ok(())
}

/// Upload one file, in parts when it crosses the multipart threshold.
///
/// With a tracker, part progress is reported as it happens; the final count
/// is left to the caller so a transfer never looks finished before S3 has
/// committed the object.
async fn send_file(
    client: &Client,
    config: &TransferConfig,
    bucket: &str,
    key: &str,
    source: &Path,
    size: u64,
    tracker: Option<&Tracker>,
) -> Result<()> {
    let content_type = content_type_for(source);

    if size < config.multipart_threshold_bytes() {
        let body = ByteStream::from_path(source).await?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await?;
        return Ok(());
    }

    let created = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .send()
        .await?;
    let upload_id = created
        .upload_id()
        .ok_or_else(|| Error::S3Operation("multipart upload returned no upload id".to_string()))?
        .to_string();

    let sent = send_parts(client, config, bucket, key, &upload_id, source, size, tracker).await;
    let parts = match sent {
        Ok(parts) => parts,
        Err(e) => {
            if let Err(abort_err) = client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(key, error = %Error::from(abort_err), "could not abort multipart upload");
            }
            return Err(e);
        }
    };

    client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(&upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build(),
        )
        .send()
        .await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn send_parts(
    client: &Client,
    config: &TransferConfig,
    bucket: &str,
    key: &str,
    upload_id: &str,
    source: &Path,
    size: u64,
    tracker: Option<&Tracker>,
) -> Result<Vec<CompletedPart>> {
    let chunk_size = config.multipart_chunk_bytes();
    let mut file = File::open(source).await?;
    let mut parts = Vec::new();
    let mut sent = 0u64;
    let mut part_number = 1i32;

    loop {
        let mut buffer = Vec::with_capacity(chunk_size);
        (&mut file).take(chunk_size as u64).read_to_end(&mut buffer).await?;
        if buffer.is_empty() {
            break;
        }
        let len = buffer.len() as u64;

        let response = client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buffer))
            .send()
            .await?;

        parts.push(
            CompletedPart::builder()
                .set_e_tag(response.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );

        sent += len;
        debug!(key, part = part_number, sent, size, "part uploaded");
        if let Some(tracker) = tracker {
            if sent < size {
                tracker.set_transferred(sent).await;
            }
        }
        part_number += 1;
    }

    Ok(parts)
}

/// Object key for a file below `root`, using `/` separators
fn key_for(root: &Path, path: &Path, prefix: Option<&str>) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "unexpected path component in {}",
                    path.display()
                )))
            }
        }
    }
    let relative_key = segments.join("/");
    Ok(match prefix.map(|p| p.trim_end_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/{}", p, relative_key),
        _ => relative_key,
    })
}

/// Local path for an object key below `root`; `None` for keys that would
/// escape it
fn path_for(root: &Path, key: &str, prefix: Option<&str>) -> Option<PathBuf> {
    let relative = match prefix {
        Some(p) => key.strip_prefix(p).unwrap_or(key),
        None => key,
    };
    let mut path = root.to_path_buf();
    let mut any = false;
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return None;
        }
        path.push(segment);
        any = true;
    }
    any.then_some(path)
}

async fn upload_directory(
    client: &Client,
    config: &TransferConfig,
    bucket: &str,
    prefix: Option<&str>,
    source_dir: &Path,
    tracker: &Tracker,
) -> Result<()> {
    let root = source_dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || -> Result<Vec<(PathBuf, u64)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() {
                let size = entry.metadata().map_err(|e| Error::Io(e.into()))?.len();
                files.push((entry.into_path(), size));
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| Error::S3Operation(format!("directory scan panicked: {}", e)))??;

    let total: u64 = files.iter().map(|(_, size)| size).sum();
    tracker.set_total(total).await;
    debug!(files = files.len(), total, "directory scanned");

    for (path, size) in files {
        let key = key_for(source_dir, &path, prefix)?;
        match send_file(client, config, bucket, &key, &path, size, None).await {
            Ok(()) => tracker.add(size).await,
            Err(e) => {
                warn!(key = %key, error = %e, "file upload failed");
                tracker
                    .file_failed(FailedFile {
                        key,
                        path,
                        detail: e.to_string(),
                    })
                    .await;
            }
        }
    }

    Ok(())
}

async fn download_file(
    client: &Client,
    bucket: &str,
    key: &str,
    destination: &Path,
    tracker: &Tracker,
) -> Result<()> {
    fetch_to_file(client, bucket, key, destination, Some(tracker)).await?;
    Ok(())
}

/// Stream one object to disk, returning the bytes written
async fn fetch_to_file(
    client: &Client,
    bucket: &str,
    key: &str,
    destination: &Path,
    tracker: Option<&Tracker>,
) -> Result<u64> {
    let response = client.get_object().bucket(bucket).key(key).send().await?;

    let total = response.content_length().map(|len| len.max(0) as u64);
    if let (Some(tracker), Some(total)) = (tracker, total) {
        tracker.set_total(total).await;
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(destination).await?;
    let mut body = response.body;
    let mut written = 0u64;

    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(tracker) = tracker {
            // the last chunk is reported after the flush
            if total.map_or(true, |t| written < t) {
                tracker.set_transferred(written).await;
            }
        }
    }
    file.flush().await?;

    if let Some(tracker) = tracker {
        tracker.set_transferred(written).await;
    }
    Ok(written)
}

async fn download_directory(
    client: &Client,
    bucket: &str,
    prefix: Option<&str>,
    destination_dir: &Path,
    tracker: &Tracker,
) -> Result<()> {
    let mut objects = Vec::new();
    let mut token = None;
    loop {
        let response = client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(token.take())
            .send()
            .await?;

        for obj in response.contents() {
            if let Some(key) = obj.key() {
                objects.push((key.to_string(), obj.size().unwrap_or(0).max(0) as u64));
            }
        }

        match response.next_continuation_token() {
            Some(next) if response.is_truncated().unwrap_or(false) => {
                token = Some(next.to_string())
            }
            _ => break,
        }
    }

    let total: u64 = objects.iter().map(|(_, size)| size).sum();
    tracker.set_total(total).await;
    debug!(objects = objects.len(), total, "bucket listed for download");

    for (key, size) in objects {
        // folder placeholders have no content to write
        if key.ends_with('/') && size == 0 {
            continue;
        }

        let Some(path) = path_for(destination_dir, &key, prefix) else {
            warn!(key = %key, "key does not map to a path inside the destination");
            tracker
                .file_failed(FailedFile {
                    path: destination_dir.to_path_buf(),
                    detail: "key does not map to a path inside the destination".to_string(),
                    key,
                })
                .await;
            continue;
        };

        match fetch_to_file(client, bucket, &key, &path, None).await {
            Ok(_) => tracker.add(size).await,
            Err(e) => {
                warn!(key = %key, error = %e, "file download failed");
                tracker
                    .file_failed(FailedFile {
                        key,
                        path,
                        detail: e.to_string(),
                    })
                    .await;
            }
        }
    }

    Ok(())
}
