//! Defines the S3 operations used by both programs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use std::path::Path;

/// An object found in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// The object storage operations needed by the provisioner and the
/// worker.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates a bucket and returns its location as reported by the
    /// service.
    async fn create_bucket(&self, bucket: &str) -> Result<String>;

    /// Replaces the bucket policy.
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()>;

    /// Lists every object in the bucket.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>>;

    /// Uploads a local file.
    async fn upload(&self, bucket: &str, path: &Path, key: &str) -> Result<()>;

    /// Downloads an object into memory.
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// [`ObjectStore`] backed by S3.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        S3Store { client }
    }

    /// Lists a page of objects under the bucket. Returns the page and
    /// a token that can be used for a subsequent fetch.
    async fn list_page(
        &self,
        bucket: &str,
        next: &Option<String>,
    ) -> Result<(Vec<RemoteObject>, Option<String>)> {
        let mut operation = self.client.list_objects_v2().bucket(bucket);
        if let Some(continuation_token) = next {
            operation = operation.continuation_token(continuation_token)
        }
        let response = operation.send().await.with_context(|| {
            format!(
                "Failed to list objects in bucket {:?} using {} continuation token",
                bucket,
                if next.is_some() { "a" } else { "no" }
            )
        })?;
        Ok((
            response
                .contents()
                .iter()
                .filter_map(|o| {
                    o.key().map(|key| RemoteObject {
                        key: String::from(key),
                        last_modified: o.last_modified().and_then(|t| t.to_chrono_utc().ok()),
                    })
                })
                .collect(),
            response.next_continuation_token().map(String::from),
        ))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        let mut operation = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        let region = self.client.config().region().map(|r| r.to_string());
        if let Some(region) = region.filter(|r| r != "us-east-1") {
            operation = operation.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            );
        }
        let response = operation
            .send()
            .await
            .with_context(|| format!("Failed to create bucket {:?}", bucket))?;
        response
            .location()
            .map(String::from)
            .ok_or_else(|| anyhow!("Bucket {:?} was created without a location", bucket))
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .with_context(|| format!("Failed to update the policy of bucket {:?}", bucket))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut next = None;
        loop {
            let (page, token) = self.list_page(bucket, &next).await?;
            objects.extend(page);
            if token.is_none() {
                break;
            }
            next = token;
        }
        Ok(objects)
    }

    async fn upload(&self, bucket: &str, path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(path).await.with_context(|| {
            format!(
                "Failed to load contents of local file {:?} for upload",
                path
            )
        })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload local file {:?} to remote object {:?} in bucket {:?}",
                    path, key, bucket
                )
            })?;
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to download object {:?} from bucket {:?}",
                    key, bucket
                )
            })?;
        let data = response.body.collect().await.with_context(|| {
            format!(
                "Failed to read the contents of remote object {:?} from bucket {:?}",
                key, bucket
            )
        })?;
        Ok(data.into_bytes().to_vec())
    }
}

/// Extracts the bucket domain from the location returned by bucket
/// creation. Path-style locations (`/name`) carry no host, in which
/// case the global S3 domain of the bucket is used.
pub fn bucket_domain(bucket: &str, location: &str) -> String {
    let host = location
        .strip_prefix("https://")
        .or_else(|| location.strip_prefix("http://"))
        .and_then(|rest| rest.split('/').next())
        .filter(|host| !host.is_empty());
    match host {
        Some(host) => String::from(host),
        None => format!("{}.s3.amazonaws.com", bucket),
    }
}
