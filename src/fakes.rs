//! In-memory stand-ins for the cloud services, recording every call.

use crate::cdn::{ContentDelivery, CreatedDistribution};
use crate::storage::{ObjectStore, RemoteObject};
use crate::worker::{Queue, QueueMessage};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use core::time::Duration;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    downloads: AtomicUsize,
    fail_uploads_for: Option<String>,
}

impl FakeStore {
    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((String::from(bucket), String::from(key)), data.to_vec());
        self
    }

    pub fn failing_upload(mut self, key: &str) -> Self {
        self.fail_uploads_for = Some(String::from(key));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        self.record(format!("create_bucket {}", bucket));
        Ok(format!("http://{}.s3.amazonaws.com/", bucket))
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        self.record(format!("put_bucket_policy {} {}", bucket, policy));
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        self.record(format!("list_objects {}", bucket));
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .map(|key| RemoteObject {
                key,
                last_modified: None,
            })
            .collect())
    }

    async fn upload(&self, bucket: &str, path: &Path, key: &str) -> Result<()> {
        self.record(format!("upload {} {}", bucket, key));
        if self.fail_uploads_for.as_deref() == Some(key) {
            bail!("upload of {} refused", key);
        }
        let data = std::fs::read(path)?;
        self.objects
            .lock()
            .unwrap()
            .insert((String::from(bucket), String::from(key)), data);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(&(String::from(bucket), String::from(key)))
            .cloned()
            .ok_or_else(|| anyhow!("no object {} in {}", key, bucket))
    }
}

#[derive(Default)]
pub struct FakeCdn {
    calls: Mutex<Vec<String>>,
    fail_key_groups: bool,
}

impl FakeCdn {
    pub fn failing_key_groups(mut self) -> Self {
        self.fail_key_groups = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContentDelivery for FakeCdn {
    async fn create_public_key(
        &self,
        name: &str,
        _comment: &str,
        _encoded_key: &str,
    ) -> Result<String> {
        self.record(format!("create_public_key {}", name));
        Ok(String::from("K2JCJMDEHXQW5F"))
    }

    async fn create_key_group(
        &self,
        name: &str,
        _comment: &str,
        keys: &[String],
    ) -> Result<String> {
        self.record(format!("create_key_group {} {}", name, keys.join(",")));
        if self.fail_key_groups {
            bail!("key group quota exceeded");
        }
        Ok(String::from("KG123"))
    }

    async fn create_origin_access_control(&self, name: &str) -> Result<String> {
        self.record(format!("create_origin_access_control {}", name));
        Ok(String::from("E2QWRUHAPOMQZL"))
    }

    async fn create_distribution(
        &self,
        _comment: &str,
        origin_domain: &str,
        origin_access_control_id: &str,
        trusted_key_groups: &[String],
    ) -> Result<CreatedDistribution> {
        self.record(format!(
            "create_distribution {} {} {}",
            origin_domain,
            origin_access_control_id,
            trusted_key_groups.join(",")
        ));
        Ok(CreatedDistribution {
            id: String::from("EDFDVBD6EXAMPLE"),
            arn: String::from("arn:aws:cloudfront::123456789012:distribution/EDFDVBD6EXAMPLE"),
            domain_name: String::from("d111111abcdef8.cloudfront.net"),
            status: String::from("InProgress"),
        })
    }
}

enum Script {
    Batches(Mutex<VecDeque<Vec<QueueMessage>>>),
    Endless(QueueMessage),
    FailThen {
        failures: AtomicUsize,
        batch: Mutex<Option<Vec<QueueMessage>>>,
    },
    Panic,
}

pub struct FakeQueue {
    script: Script,
    receives: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl Default for FakeQueue {
    fn default() -> Self {
        FakeQueue::with_batches(Vec::new())
    }
}

impl FakeQueue {
    fn scripted(script: Script) -> Self {
        FakeQueue {
            script,
            receives: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            fail_deletes: false,
        }
    }

    /// Hands out the batches in order, then nothing.
    pub fn with_batches(batches: Vec<Vec<QueueMessage>>) -> Self {
        FakeQueue::scripted(Script::Batches(Mutex::new(batches.into())))
    }

    /// Hands out a copy of `message` on every receive.
    pub fn endless(message: QueueMessage) -> Self {
        FakeQueue::scripted(Script::Endless(message))
    }

    /// Fails the first `failures` receives, then hands out `batch`
    /// once, then nothing.
    pub fn failing_then(failures: usize, batch: Vec<QueueMessage>) -> Self {
        FakeQueue::scripted(Script::FailThen {
            failures: AtomicUsize::new(failures),
            batch: Mutex::new(Some(batch)),
        })
    }

    /// Panics on receive.
    pub fn panicking() -> Self {
        FakeQueue::scripted(Script::Panic)
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Queue for FakeQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Batches(batches) => {
                let next = batches.lock().unwrap().pop_front();
                match next {
                    Some(batch) => Ok(batch),
                    None => {
                        // an empty long-poll
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Vec::new())
                    }
                }
            }
            Script::Endless(message) => Ok(vec![message.clone()]),
            Script::FailThen { failures, batch } => {
                let failing = failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    bail!("service unavailable");
                }
                let next = batch.lock().unwrap().take();
                match next {
                    Some(batch) => Ok(batch),
                    None => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Vec::new())
                    }
                }
            }
            Script::Panic => panic!("receive exploded"),
        }
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        if self.fail_deletes {
            bail!("delete refused");
        }
        let receipt_handle = message
            .receipt_handle
            .clone()
            .ok_or_else(|| anyhow!("no receipt handle"))?;
        self.deleted.lock().unwrap().push(receipt_handle);
        Ok(())
    }
}
