//! Defines configuration as read from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default `checkpoint_path` value.
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data.json")
}

/// Default `public_key_path` value.
fn default_public_key_path() -> PathBuf {
    PathBuf::from("public_key.pem")
}

/// Default `private_key_path` value.
fn default_private_key_path() -> PathBuf {
    PathBuf::from("private_key.pem")
}

/// Default `report_path` value.
fn default_report_path() -> PathBuf {
    PathBuf::from("output.csv")
}

/// Default `match_key` value.
fn default_match_key() -> String {
    String::from("*.csv")
}

/// Default `signed_url_validity_hours` value. Sixty days.
fn default_signed_url_validity_hours() -> i64 {
    1440
}

/// Default `queue_name` value.
fn default_queue_name() -> String {
    String::from("sqswiths3")
}

/// Default `max_number_of_messages` value.
fn default_max_number_of_messages() -> i32 {
    2
}

/// Default `wait_time_seconds` value.
fn default_wait_time_seconds() -> i32 {
    15
}

/// Default `channel_capacity` value.
fn default_channel_capacity() -> usize {
    2
}

/// Default `listen_addr` value.
fn default_listen_addr() -> String {
    String::from("0.0.0.0:8080")
}

/// Selects how the AWS SDK resolves credentials and endpoints. Setting
/// `ENV=local` enables the local-development override, where the
/// region, profile and endpoint given here replace the default
/// provider chain resolution.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct AwsSettings {
    /// The deployment environment. Only `local` has a meaning.
    #[serde(default)]
    pub env: Option<String>,

    /// Region applied in local mode.
    #[serde(default)]
    pub aws_region: Option<String>,

    /// Shared config profile applied in local mode.
    #[serde(default)]
    pub aws_profile: Option<String>,

    /// Endpoint URL applied in local mode, e.g. a localstack
    /// instance. A missing scheme is interpreted as `https://`.
    #[serde(default)]
    pub aws_endpoint: Option<String>,
}

impl AwsSettings {
    /// Whether the local-development override is active.
    pub fn is_local(&self) -> bool {
        self.env.as_deref() == Some("local")
    }
}

/// Settings for the provisioning CLI: where its local files live and
/// how signed URLs are produced.
#[derive(Deserialize, Debug, Clone)]
pub struct ProvisionSettings {
    /// The JSON file holding the provisioning checkpoint.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// The PEM-encoded public key uploaded to CloudFront.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,

    /// The PEM-encoded private key used to sign URLs.
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,

    /// The CSV report receiving file names and signed URLs.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Selects the files to upload or sign. The star (*) can be used
    /// as a wildcard matching any number of non-slash characters.
    #[serde(default = "default_match_key")]
    pub match_key: String,

    /// How long a signed URL stays valid.
    #[serde(default = "default_signed_url_validity_hours")]
    pub signed_url_validity_hours: i64,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        ProvisionSettings {
            checkpoint_path: default_checkpoint_path(),
            public_key_path: default_public_key_path(),
            private_key_path: default_private_key_path(),
            report_path: default_report_path(),
            match_key: default_match_key(),
            signed_url_validity_hours: default_signed_url_validity_hours(),
        }
    }
}

/// Settings for the queue worker. Read from variables prefixed with
/// `SQS_`, e.g. `SQS_QUEUE_NAME`.
#[derive(Deserialize, Debug, Clone)]
pub struct WorkerSettings {
    /// The name of the queue receiving S3 event notifications.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// The maximum batch size of a single receive call.
    #[serde(default = "default_max_number_of_messages")]
    pub max_number_of_messages: i32,

    /// The long-poll wait time of a single receive call.
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: i32,

    /// The capacity of the channel between the poller and the
    /// consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            queue_name: default_queue_name(),
            max_number_of_messages: default_max_number_of_messages(),
            wait_time_seconds: default_wait_time_seconds(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Settings for the worker's HTTP listener.
#[derive(Deserialize, Debug, Clone)]
pub struct ListenerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Read the AWS settings from the environment.
pub fn aws() -> Result<AwsSettings> {
    envy::from_env().context("Invalid AWS settings in the environment")
}

/// Read the provisioning settings from the environment.
pub fn provision() -> Result<ProvisionSettings> {
    envy::from_env().context("Invalid provisioning settings in the environment")
}

/// Read the worker settings from `SQS_`-prefixed variables.
pub fn worker() -> Result<WorkerSettings> {
    envy::prefixed("SQS_")
        .from_env()
        .context("Invalid SQS_* settings in the environment")
}

/// Read the listener settings from the environment.
pub fn listener() -> Result<ListenerSettings> {
    envy::from_env().context("Invalid LISTEN_ADDR in the environment")
}
