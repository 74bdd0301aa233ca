//! Bucket-level pass-throughs

use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use chrono::{DateTime, Utc};
use tracing::info;

use super::S3Backend;
use crate::error::Result;

/// A bucket owned by the caller
#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

impl S3Backend {
    /// Create an empty bucket in the client's region; returns its location
    pub async fn create_bucket(&self, bucket: &str) -> Result<Option<String>> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if let Some(region) = self.client.config().region().map(|r| r.as_ref().to_string()) {
            if region != "us-east-1" {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region.as_str()))
                        .build(),
                );
            }
        }

        let response = request.send().await?;
        let location = response.location().map(str::to_string);
        info!(bucket, location = ?location, "bucket created");

        Ok(location)
    }

    /// List every bucket the credentials can see
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self.client.list_buckets().send().await?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketInfo {
                    name: b.name()?.to_string(),
                    created: b
                        .creation_date()
                        .and_then(|d| DateTime::<Utc>::from_timestamp(d.secs(), d.subsec_nanos())),
                })
            })
            .collect())
    }

    /// Remove a bucket's static website configuration (succeeds if none exists)
    pub async fn delete_bucket_website(&self, bucket: &str) -> Result<()> {
        self.client.delete_bucket_website().bucket(bucket).send().await?;
        info!(bucket, "website configuration removed");

        Ok(())
    }
}
