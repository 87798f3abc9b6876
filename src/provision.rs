//! Defines the provisioning steps: each step consults the checkpoint,
//! skips itself if its resource is already recorded, and otherwise
//! creates the resource and records it before returning.

use crate::cdn::ContentDelivery;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::conf::ProvisionSettings;
use crate::policy::PolicyDocument;
use crate::report::Report;
use crate::sign::UrlSigner;
use crate::storage::{bucket_domain, ObjectStore};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// The name given to the uploaded public key and its key group.
pub const KEY_NAME: &str = "bucket";

/// The comment attached to every CloudFront resource created here.
pub const COMMENT: &str = "Server S3 object Presigned URL";

/// Compiles a key filter where `*` matches any run of characters,
/// slashes included, so `*.csv` selects CSV keys under any prefix.
pub fn key_matcher(match_key: &str) -> Result<Regex> {
    let pattern = match_key
        .split('*')
        .map(regex::escape)
        .collect::<Vec<String>>()
        .join(".*?");
    Regex::new(&format!("^{}$", pattern))
        .with_context(|| format!("Invalid key filter {:?}", match_key))
}

/// Runs the provisioning steps against a storage service and a
/// content delivery service.
pub struct Provisioner<S, C> {
    store: S,
    cdn: C,
    checkpoint: CheckpointStore,
    settings: ProvisionSettings,
}

impl<S: ObjectStore, C: ContentDelivery> Provisioner<S, C> {
    pub fn new(store: S, cdn: C, settings: ProvisionSettings) -> Self {
        Provisioner {
            store,
            cdn,
            checkpoint: CheckpointStore::new(&settings.checkpoint_path),
            settings,
        }
    }

    /// Creates the bucket holding the published files.
    #[instrument(skip(self))]
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut checkpoint = self.checkpoint.load()?;
        if !checkpoint.bucket_domain.is_empty() {
            info!(
                "Bucket {:?} is already recorded at {}",
                &checkpoint.bucket_name, &checkpoint.bucket_domain
            );
            return Ok(());
        }
        let location = self.store.create_bucket(bucket).await?;
        checkpoint.bucket_name = String::from(bucket);
        checkpoint.bucket_domain = bucket_domain(bucket, &location);
        self.checkpoint.save(&checkpoint)?;
        info!("Created bucket {:?} at {}", bucket, &checkpoint.bucket_domain);
        Ok(())
    }

    /// Uploads the public key used to verify signed URLs and groups it
    /// into a key group. Returns the key and key group ids.
    #[instrument(skip(self))]
    pub async fn upload_certificate(&self) -> Result<(String, String)> {
        let mut checkpoint = self.checkpoint.load()?;
        if checkpoint.cf_key_id.is_empty() {
            let public_key = fs::read_to_string(&self.settings.public_key_path).with_context(|| {
                format!(
                    "Failed to read public key file {:?}",
                    &self.settings.public_key_path
                )
            })?;
            checkpoint.cf_key_id = self
                .cdn
                .create_public_key(KEY_NAME, COMMENT, &public_key)
                .await?;
            self.checkpoint.save(&checkpoint)?;
            info!("Uploaded public key {}", &checkpoint.cf_key_id);
        }
        if checkpoint.cf_group_id.is_empty() {
            checkpoint.cf_group_id = self
                .cdn
                .create_key_group(KEY_NAME, COMMENT, &[checkpoint.cf_key_id.clone()])
                .await?;
            self.checkpoint.save(&checkpoint)?;
            info!("Created key group {}", &checkpoint.cf_group_id);
        }
        Ok((checkpoint.cf_key_id, checkpoint.cf_group_id))
    }

    /// Creates the distribution serving the bucket, restricted to URLs
    /// signed with the key group.
    #[instrument(skip(self))]
    pub async fn create_distribution(&self) -> Result<()> {
        let mut checkpoint = self.checkpoint.load()?;
        if !checkpoint.distribution_arn.is_empty() {
            info!(
                "Distribution {} is already recorded",
                &checkpoint.distribution_arn
            );
            return Ok(());
        }
        if checkpoint.bucket_domain.is_empty() {
            bail!(
                "No bucket is recorded in {:?}; create one first",
                self.checkpoint.path()
            );
        }
        if checkpoint.cf_group_id.is_empty() {
            bail!(
                "No key group is recorded in {:?}; upload the certificate first",
                self.checkpoint.path()
            );
        }
        let origin_access_control_id = self
            .cdn
            .create_origin_access_control(&checkpoint.bucket_domain)
            .await?;
        let created = self
            .cdn
            .create_distribution(
                COMMENT,
                &checkpoint.bucket_domain,
                &origin_access_control_id,
                &[checkpoint.cf_group_id.clone()],
            )
            .await?;
        info!(
            "Created distribution {} at {} ({}): {}",
            &created.id, &created.domain_name, &created.status, &created.arn
        );
        checkpoint.cloud_front_domain = format!("https://{}", created.domain_name);
        checkpoint.distribution_arn = created.arn;
        self.checkpoint.save(&checkpoint)
    }

    /// Lets the distribution read the bucket.
    #[instrument(skip(self))]
    pub async fn update_bucket_policy(&self) -> Result<()> {
        let checkpoint = self.checkpoint.load()?;
        if checkpoint.bucket_name.is_empty() || checkpoint.distribution_arn.is_empty() {
            bail!(
                "Both a bucket and a distribution must be recorded in {:?} to update the policy",
                self.checkpoint.path()
            );
        }
        let policy = PolicyDocument::cloudfront_read_only(
            &checkpoint.bucket_name,
            &checkpoint.distribution_arn,
        );
        let policy = serde_json::to_string(&policy)?;
        self.store
            .put_bucket_policy(&checkpoint.bucket_name, &policy)
            .await?;
        info!("Updated the policy of bucket {:?}", &checkpoint.bucket_name);
        Ok(())
    }

    /// Loads the signer for the recorded public key.
    fn signer(&self, checkpoint: &Checkpoint) -> Result<UrlSigner> {
        if checkpoint.cf_key_id.is_empty() || checkpoint.cloud_front_domain.is_empty() {
            bail!(
                "Signing requires a public key and a distribution recorded in {:?}",
                self.checkpoint.path()
            );
        }
        UrlSigner::from_pem_file(&checkpoint.cf_key_id, &self.settings.private_key_path)
    }

    /// The expiry given to URLs signed now.
    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::hours(self.settings.signed_url_validity_hours)
    }

    /// Uploads every matching file in `dir` and reports its signed
    /// URL. Returns the number of rows added to the report.
    #[instrument(skip(self))]
    pub async fn publish_directory(&self, dir: &Path) -> Result<usize> {
        let checkpoint = self.checkpoint.load()?;
        if checkpoint.bucket_name.is_empty() {
            bail!("No bucket is recorded in {:?}", self.checkpoint.path());
        }
        let signer = self.signer(&checkpoint)?;
        let matcher = key_matcher(&self.settings.match_key)?;
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to read directory {:?}", dir))? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if matcher.is_match(name) {
                    files.push((String::from(name), path.clone()));
                }
            }
        }
        files.sort();

        let expires = self.expiry();
        let mut report = Report::append_to(&self.settings.report_path)?;
        for (name, path) in files {
            if let Err(e) = self
                .store
                .upload(&checkpoint.bucket_name, &path, &name)
                .await
            {
                warn!("Skipping {:?}: {:?}", &name, e);
                continue;
            }
            match signer.sign(&format!("{}/{}", &checkpoint.cloud_front_domain, &name), expires) {
                Ok(url) => report.record(&name, &url)?,
                Err(e) => warn!("Couldn't sign a URL for {:?}: {:?}", &name, e),
            }
        }
        let rows = report.rows();
        report.finish()?;
        info!("Published {} files from {:?}", rows, dir);
        Ok(rows)
    }

    /// Reports a signed URL for every matching object already in the
    /// bucket. Returns the number of rows added to the report.
    #[instrument(skip(self))]
    pub async fn publish_bucket(&self) -> Result<usize> {
        let checkpoint = self.checkpoint.load()?;
        if checkpoint.bucket_name.is_empty() {
            bail!("No bucket is recorded in {:?}", self.checkpoint.path());
        }
        let signer = self.signer(&checkpoint)?;
        let matcher = key_matcher(&self.settings.match_key)?;
        let objects = self.store.list_objects(&checkpoint.bucket_name).await?;

        let expires = self.expiry();
        let mut report = Report::append_to(&self.settings.report_path)?;
        for object in objects.iter().filter(|o| matcher.is_match(&o.key)) {
            if let Some(modified) = object.last_modified {
                info!("Signing {:?}, last modified {}", &object.key, modified);
            }
            match signer.sign(
                &format!("{}/{}", &checkpoint.cloud_front_domain, &object.key),
                expires,
            ) {
                Ok(url) => report.record(&object.key, &url)?,
                Err(e) => warn!("Couldn't sign a URL for {:?}: {:?}", &object.key, e),
            }
        }
        let rows = report.rows();
        report.finish()?;
        info!(
            "Signed {} of {} objects in bucket {:?}",
            rows,
            objects.len(),
            &checkpoint.bucket_name
        );
        Ok(rows)
    }

    /// Forgets everything recorded so far.
    pub fn clean(&self) -> Result<()> {
        self.checkpoint.clean()
    }
}
