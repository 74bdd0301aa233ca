//! Scripted in-memory backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bulkstore_core::{
    DownloadSpec, Error, FailedFile, ListMode, ListPage, ObjectIdentity, ObjectStoreBackend,
    PageToken, Result, TransferId, TransferState, TransferStatus, UploadSpec,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BUCKET: &str = "test-bucket";

/// Backend whose listing pages, delete failures and transfer progress are
/// fixed up front. Every call is recorded.
#[derive(Default)]
pub struct ScriptedBackend {
    pages: Vec<std::result::Result<Vec<ObjectIdentity>, String>>,
    stuck_page: Option<usize>,
    failing_keys: HashSet<String>,
    container_delete_error: Option<String>,
    pending_scripts: Mutex<VecDeque<Vec<TransferStatus>>>,
    transfers: Mutex<HashMap<TransferId, VecDeque<TransferStatus>>>,
    pub list_calls: AtomicUsize,
    pub polls: AtomicUsize,
    pub deleted: Mutex<Vec<ObjectIdentity>>,
    pub containers_deleted: Mutex<Vec<String>>,
    pub forgotten: Mutex<Vec<TransferId>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page of plain keys
    pub fn page(mut self, keys: &[&str]) -> Self {
        self.pages
            .push(Ok(keys.iter().map(|k| ObjectIdentity::new(BUCKET, *k)).collect()));
        self
    }

    /// Add a page of (key, version) pairs
    pub fn version_page(mut self, versions: &[(&str, &str)]) -> Self {
        self.pages.push(Ok(versions
            .iter()
            .map(|(k, v)| ObjectIdentity::versioned(BUCKET, *k, *v))
            .collect()));
        self
    }

    /// Add a page whose fetch fails
    pub fn failing_page(mut self, detail: &str) -> Self {
        self.pages.push(Err(detail.to_string()));
        self
    }

    /// Page `index` hands back the token it was requested with
    pub fn stuck_at(mut self, index: usize) -> Self {
        self.stuck_page = Some(index);
        self
    }

    pub fn fail_delete(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn fail_container_delete(mut self, detail: &str) -> Self {
        self.container_delete_error = Some(detail.to_string());
        self
    }

    /// Statuses returned by successive polls of the next transfer started; the
    /// last one repeats
    pub fn transfer_script(self, steps: Vec<TransferStatus>) -> Self {
        self.pending_scripts.lock().unwrap().push_back(steps);
        self
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.key().to_string())
            .collect()
    }

    fn start(&self) -> TransferId {
        let id = TransferId::new();
        let script = self
            .pending_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        self.transfers.lock().unwrap().insert(id, script.into());
        id
    }
}

#[async_trait]
impl ObjectStoreBackend for ScriptedBackend {
    async fn list_page(
        &self,
        _bucket: &str,
        _mode: ListMode,
        token: Option<PageToken>,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let index = match token {
            None => 0,
            Some(PageToken::Continuation(t)) => t.parse::<usize>().unwrap(),
            Some(other) => panic!("unexpected token {:?}", other),
        };

        let items = match self.pages.get(index) {
            None => return Ok(ListPage::default()),
            Some(Err(detail)) => return Err(Error::S3Operation(detail.clone())),
            Some(Ok(items)) => items.clone(),
        };

        if self.stuck_page == Some(index) {
            return Ok(ListPage::with_next(items, PageToken::Continuation(index.to_string())));
        }

        Ok(if index + 1 < self.pages.len() {
            ListPage::with_next(items, PageToken::Continuation((index + 1).to_string()))
        } else {
            ListPage::last(items)
        })
    }

    async fn delete_object(&self, identity: &ObjectIdentity) -> Result<()> {
        self.deleted.lock().unwrap().push(identity.clone());
        if self.failing_keys.contains(identity.key()) {
            return Err(Error::S3Operation("AccessDenied".to_string()));
        }
        Ok(())
    }

    async fn delete_container(&self, bucket: &str) -> Result<()> {
        self.containers_deleted.lock().unwrap().push(bucket.to_string());
        match &self.container_delete_error {
            Some(detail) => Err(Error::S3Operation(detail.clone())),
            None => Ok(()),
        }
    }

    async fn begin_upload(&self, _spec: &UploadSpec) -> Result<TransferId> {
        Ok(self.start())
    }

    async fn begin_download(&self, _spec: &DownloadSpec) -> Result<TransferId> {
        Ok(self.start())
    }

    async fn query_transfer(&self, id: TransferId) -> Result<TransferStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut transfers = self.transfers.lock().unwrap();
        let steps = transfers.get_mut(&id).ok_or(Error::UnknownTransfer(id))?;
        let status = if steps.len() > 1 {
            steps.pop_front().unwrap_or_default()
        } else {
            steps.front().cloned().unwrap_or_default()
        };
        Ok(status)
    }

    async fn forget_transfer(&self, id: TransferId) {
        self.forgotten.lock().unwrap().push(id);
    }
}

pub fn in_progress(transferred: u64, total: Option<u64>) -> TransferStatus {
    TransferStatus {
        transferred_bytes: transferred,
        total_bytes: total,
        state: TransferState::InProgress,
        ..Default::default()
    }
}

pub fn failed(transferred: u64, total: u64, detail: &str) -> TransferStatus {
    TransferStatus {
        transferred_bytes: transferred,
        total_bytes: Some(total),
        state: TransferState::Failed,
        failure_detail: Some(detail.to_string()),
        failed_files: Vec::new(),
    }
}

pub fn failed_file(key: &str) -> FailedFile {
    FailedFile {
        key: key.to_string(),
        path: PathBuf::from("/tmp/upload").join(key),
        detail: "RequestTimeout".to_string(),
    }
}
