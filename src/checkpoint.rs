//! Defines the provisioning checkpoint: a flat record of the cloud
//! resources created so far, persisted as a local JSON file so that
//! reruns skip the steps already done.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// The provisioning progress. An empty field means the corresponding
/// step hasn't completed yet.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Checkpoint {
    pub bucket_name: String,
    pub bucket_domain: String,
    #[serde(rename = "CFGroupId")]
    pub cf_group_id: String,
    #[serde(rename = "CFKeyId")]
    pub cf_key_id: String,
    pub cloud_front_domain: String,
    pub distribution_arn: String,
}

/// Handle to the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint. A missing file is created holding an
    /// empty record; an unreadable one is reported and treated as
    /// empty.
    pub fn load(&self) -> Result<Checkpoint> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let checkpoint = Checkpoint::default();
                self.save(&checkpoint)?;
                return Ok(checkpoint);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint file {:?}", &self.path)
                })
            }
        };
        match serde_json::from_slice(&data) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e) => {
                warn!(
                    "Checkpoint file {:?} couldn't be parsed, starting empty: {:?}",
                    &self.path, e
                );
                Ok(Checkpoint::default())
            }
        }
    }

    /// Writes the checkpoint, replacing the previous file atomically.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let data = serde_json::to_vec_pretty(checkpoint)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).with_context(|| {
            format!("Failed to create a temporary file next to {:?}", &self.path)
        })?;
        file.write_all(&data)
            .with_context(|| format!("Failed to write checkpoint data for {:?}", &self.path))?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace checkpoint file {:?}", &self.path))?;
        Ok(())
    }

    /// Deletes the checkpoint file, if any.
    pub fn clean(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed checkpoint file {:?}", &self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove checkpoint file {:?}", &self.path)),
        }
    }
}
