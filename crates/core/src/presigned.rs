//! Presigned URL generation

use crate::config::{PresignConfig, MAX_PRESIGN_EXPIRATION_SECS};
use crate::error::{Error, Result};
use crate::s3::S3Backend;
use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// HTTP methods for presigned URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignedMethod {
    Get,
    Put,
    Delete,
}

impl PresignedMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PresignedMethod::Get => "GET",
            PresignedMethod::Put => "PUT",
            PresignedMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for PresignedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for generating presigned URLs
#[derive(Debug, Clone)]
pub struct PresignedUrlConfig {
    /// HTTP method
    pub method: PresignedMethod,
    /// Expiration time
    pub expires_in: Duration,
    /// Content type the uploader must send (PUT only)
    pub content_type: Option<String>,
}

impl PresignedUrlConfig {
    /// Create a new presigned URL configuration
    pub fn new(method: PresignedMethod, expires_in: Duration) -> Self {
        Self {
            method,
            expires_in,
            content_type: None,
        }
    }

    /// Use the configured default expiration
    pub fn with_defaults(method: PresignedMethod, defaults: &PresignConfig) -> Self {
        Self::new(method, Duration::from_secs(defaults.default_expiration))
    }

    /// Set content type (useful for PUT requests)
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Reject lifetimes the presigner would not honor
    pub fn validate(&self) -> Result<()> {
        if self.expires_in.is_zero() {
            return Err(Error::Presign("expiration must be at least one second".to_string()));
        }
        if self.expires_in.as_secs() > MAX_PRESIGN_EXPIRATION_SECS {
            return Err(Error::Presign(format!(
                "expiration cannot exceed 7 days ({} seconds)",
                MAX_PRESIGN_EXPIRATION_SECS
            )));
        }
        if self.content_type.is_some() && self.method != PresignedMethod::Put {
            return Err(Error::Presign(format!(
                "content type only applies to PUT URLs, not {}",
                self.method
            )));
        }
        Ok(())
    }
}

/// A signed, time-limited URL
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub method: PresignedMethod,
    pub expires_at: DateTime<Utc>,
}

impl S3Backend {
    /// Sign a URL granting `config.method` on one object until it expires
    pub async fn presign(
        &self,
        bucket: &str,
        key: &str,
        config: PresignedUrlConfig,
    ) -> Result<PresignedUrl> {
        config.validate()?;
        let presigning = PresigningConfig::expires_in(config.expires_in)?;

        let request: PresignedRequest = match config.method {
            PresignedMethod::Get => {
                self.client()
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .presigned(presigning)
                    .await?
            }
            PresignedMethod::Put => {
                self.client()
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .set_content_type(config.content_type.clone())
                    .presigned(presigning)
                    .await?
            }
            PresignedMethod::Delete => {
                self.client()
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .presigned(presigning)
                    .await?
            }
        };

        let lifetime = chrono::Duration::from_std(config.expires_in)
            .map_err(|e| Error::Presign(format!("Time error: {}", e)))?;

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            method: config.method,
            expires_at: Utc::now() + lifetime,
        })
    }
}
