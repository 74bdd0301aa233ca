//! `ObjectStoreBackend` over the AWS S3 SDK

mod buckets;
mod objects;
mod transfer;

pub use buckets::BucketInfo;
pub use objects::{ObjectMetadata, PutOptions};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use tracing::debug;

use crate::backend::ObjectStoreBackend;
use crate::config::{StorageConfig, TransferConfig};
use crate::error::{Error, Result};
use crate::object::{ListMode, ListPage, ObjectIdentity, PageToken};
use crate::transfer::{DownloadSpec, TransferId, TransferStatus, UploadSpec};
use transfer::TransferRegistry;

/// S3 (or S3-compatible) backend
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    transfer_config: TransferConfig,
    transfers: TransferRegistry,
}

impl S3Backend {
    /// Build a client from the storage section of the config.
    ///
    /// Static keys are used when configured; otherwise the SDK's default
    /// provider chain resolves credentials.
    pub async fn from_config(
        storage: &StorageConfig,
        transfer_config: TransferConfig,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&storage.access_key_id, &storage.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key_id, secret_access_key, None, None, "bulkstore");
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &storage.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.force_path_style)
            .build();

        Ok(Self::from_client(Client::from_conf(s3_config), transfer_config))
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, transfer_config: TransferConfig) -> Self {
        Self {
            client,
            transfer_config,
            transfers: TransferRegistry::default(),
        }
    }

    /// Underlying SDK client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn list_objects_page(&self, bucket: &str, token: Option<PageToken>) -> Result<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket);
        match token {
            None => {}
            Some(PageToken::Continuation(t)) => request = request.continuation_token(t),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "object listing cannot resume from {:?}",
                    other
                )))
            }
        }

        let response = request.send().await?;

        let items = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(|key| ObjectIdentity::new(bucket, key))
            .collect();

        let next = if response.is_truncated().unwrap_or(false) {
            response
                .next_continuation_token()
                .map(|t| PageToken::Continuation(t.to_string()))
        } else {
            None
        };

        Ok(ListPage { items, next })
    }

    async fn list_versions_page(&self, bucket: &str, token: Option<PageToken>) -> Result<ListPage> {
        let mut request = self.client.list_object_versions().bucket(bucket);
        match token {
            None => {}
            Some(PageToken::Versions {
                key_marker,
                version_id_marker,
            }) => {
                request = request
                    .key_marker(key_marker)
                    .set_version_id_marker(version_id_marker);
            }
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "version listing cannot resume from {:?}",
                    other
                )))
            }
        }

        let response = request.send().await?;

        let versions = response
            .versions()
            .iter()
            .filter_map(|v| Some((v.key()?, v.version_id()?)));
        let markers = response
            .delete_markers()
            .iter()
            .filter_map(|m| Some((m.key()?, m.version_id()?)));
        let items = versions
            .chain(markers)
            .map(|(key, version)| ObjectIdentity::versioned(bucket, key, version))
            .collect();

        let next = match (response.is_truncated().unwrap_or(false), response.next_key_marker()) {
            (true, Some(key_marker)) => Some(PageToken::Versions {
                key_marker: key_marker.to_string(),
                version_id_marker: response.next_version_id_marker().map(str::to_string),
            }),
            _ => None,
        };

        Ok(ListPage { items, next })
    }
}

#[async_trait]
impl ObjectStoreBackend for S3Backend {
    async fn list_page(
        &self,
        bucket: &str,
        mode: ListMode,
        token: Option<PageToken>,
    ) -> Result<ListPage> {
        debug!(bucket, ?mode, resume = token.is_some(), "listing page");
        match mode {
            ListMode::Objects => self.list_objects_page(bucket, token).await,
            ListMode::Versions => self.list_versions_page(bucket, token).await,
        }
    }

    async fn delete_object(&self, identity: &ObjectIdentity) -> Result<()> {
        self.client
            .delete_object()
            .bucket(identity.bucket())
            .key(identity.key())
            .set_version_id(identity.version_id().map(str::to_string))
            .send()
            .await?;

        Ok(())
    }

    async fn delete_container(&self, bucket: &str) -> Result<()> {
        self.client.delete_bucket().bucket(bucket).send().await?;

        Ok(())
    }

    async fn begin_upload(&self, spec: &UploadSpec) -> Result<TransferId> {
        let tracker = self.transfers.register().await;
        let id = tracker.id();
        transfer::spawn_upload(
            self.client.clone(),
            self.transfer_config.clone(),
            spec.clone(),
            tracker,
        );
        Ok(id)
    }

    async fn begin_download(&self, spec: &DownloadSpec) -> Result<TransferId> {
        let tracker = self.transfers.register().await;
        let id = tracker.id();
        transfer::spawn_download(self.client.clone(), spec.clone(), tracker);
        Ok(id)
    }

    async fn query_transfer(&self, id: TransferId) -> Result<TransferStatus> {
        self.transfers
            .observe(id)
            .await
            .ok_or(Error::UnknownTransfer(id))
    }

    async fn forget_transfer(&self, id: TransferId) {
        self.transfers.forget(id).await;
    }
}
