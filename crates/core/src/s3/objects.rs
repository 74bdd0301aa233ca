//! Single-object operations: put with tags/metadata, read, head, tagging

use aws_sdk_s3::{
    primitives::ByteStream,
    types::{Tag, Tagging},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::S3Backend;
use crate::error::{Error, Result};

/// Optional attributes for an upload
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Guessed from the file name when absent
    pub content_type: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub metadata: HashMap<String, String>,
}

impl PutOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Object metadata
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub content_type: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub metadata: HashMap<String, String>,
}

/// `x-amz-tagging` form of a tag set
pub(crate) fn encode_tagging(tags: &BTreeMap<String, String>) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    Some(
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(tags)
            .finish(),
    )
}

fn to_chrono(dt: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl S3Backend {
    /// Upload a local file in one request
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        options: PutOptions,
    ) -> Result<()> {
        let content_type = options.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(path).first_or_octet_stream().to_string()
        });
        let body = ByteStream::from_path(path).await?;
        self.put_body(bucket, key, body, content_type, options).await
    }

    /// Upload bytes in one request
    pub async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<()> {
        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        self.put_body(bucket, key, ByteStream::from(body), content_type, options)
            .await
    }

    async fn put_body(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_type: String,
        options: PutOptions,
    ) -> Result<()> {
        let metadata = (!options.metadata.is_empty()).then_some(options.metadata);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_tagging(encode_tagging(&options.tags))
            .set_metadata(metadata)
            .body(body)
            .send()
            .await?;

        debug!(bucket, key, tags = options.tags.len(), "object stored");
        Ok(())
    }

    /// Download an object into memory
    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self.client.get_object().bucket(bucket).key(key).send().await?;
        let body = response.body.collect().await?.into_bytes();

        Ok(body.to_vec())
    }

    /// Read a text object line by line without storing it locally
    pub async fn read_object_lines(&self, bucket: &str, key: &str) -> Result<Vec<String>> {
        let response = self.client.get_object().bucket(bucket).key(key).send().await?;
        let mut lines = BufReader::new(response.body.into_async_read()).lines();

        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await? {
            out.push(line);
        }
        Ok(out)
    }

    /// Get object metadata
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let response = self.client.head_object().bucket(bucket).key(key).send().await?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0),
            content_type: response.content_type().unwrap_or("").to_string(),
            last_modified: response.last_modified().and_then(to_chrono),
            etag: response.e_tag().unwrap_or("").to_string(),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    /// Check if an object exists
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map_or(false, |se| se.is_not_found()) => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Current tag set of an object
    pub async fn get_object_tags(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>> {
        let response = self
            .client
            .get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;

        Ok(response
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    /// Replace the tag set of an object
    pub async fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let tagging = Tagging::builder().set_tag_set(Some(tag_set)).build()?;

        self.client
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await?;

        debug!(bucket, key, tags = tags.len(), "tags replaced");
        Ok(())
    }
}
