//! Defines the queue worker: a poller long-polls the queue and feeds
//! messages through a bounded channel to a single consumer, which
//! downloads the objects named by each S3 event and deletes the
//! message once everything succeeded.

use crate::conf::WorkerSettings;
use crate::event::{self, ObjectRef};
use crate::storage::ObjectStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use core::time::Duration;
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The pause after a failed receive, in milliseconds.
const RECEIVE_ERROR_PAUSE: u64 = 300;

/// A received queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: Option<String>,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
}

/// The queue operations needed by the worker.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Long-polls for the next batch of messages.
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    /// Removes a message from the queue.
    async fn delete(&self, message: &QueueMessage) -> Result<()>;
}

/// [`Queue`] backed by SQS.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    max_number_of_messages: i32,
    wait_time_seconds: i32,
}

impl SqsQueue {
    /// Resolves the queue URL from the configured queue name.
    pub async fn connect(client: Client, settings: &WorkerSettings) -> Result<Self> {
        let response = client
            .get_queue_url()
            .queue_name(&settings.queue_name)
            .send()
            .await
            .with_context(|| format!("Failed to get the URL of queue {:?}", &settings.queue_name))?;
        let queue_url = response
            .queue_url()
            .map(String::from)
            .ok_or_else(|| anyhow!("Queue {:?} has no URL", &settings.queue_name))?;
        info!("Consuming from queue {}", &queue_url);
        Ok(SqsQueue {
            client,
            queue_url,
            max_number_of_messages: settings.max_number_of_messages,
            wait_time_seconds: settings.wait_time_seconds,
        })
    }
}

#[async_trait]
impl Queue for SqsQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .message_attribute_names("All")
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .with_context(|| format!("Failed to receive messages from {:?}", &self.queue_url))?;
        Ok(response
            .messages()
            .iter()
            .map(|message| QueueMessage {
                id: message.message_id().map(String::from),
                receipt_handle: message.receipt_handle().map(String::from),
                body: message.body().map(String::from),
            })
            .collect())
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        let receipt_handle = message
            .receipt_handle
            .as_deref()
            .ok_or_else(|| anyhow!("Message {:?} has no receipt handle", &message.id))?;
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .with_context(|| format!("Failed to delete message {:?}", &message.id))?;
        Ok(())
    }
}

/// Receives messages forever, forwarding them to the consumer. Only
/// returns when the consumer went away.
pub async fn poll<Q: Queue>(queue: Arc<Q>, sender: mpsc::Sender<QueueMessage>) -> Result<()> {
    loop {
        match queue.receive().await {
            Ok(messages) => {
                for message in messages {
                    sender
                        .send(message)
                        .await
                        .map_err(|_| anyhow!("The consumer is gone"))?;
                }
            }
            Err(e) => {
                warn!("Error while receiving messages: {:?}", e);
                sleep(Duration::from_millis(RECEIVE_ERROR_PAUSE)).await;
            }
        }
    }
}

/// Converts the end of the poller task into an error.
fn poller_stopped(result: Result<Result<()>, tokio::task::JoinError>) -> anyhow::Error {
    match result {
        Ok(Ok(())) => anyhow!("The queue poller stopped"),
        Ok(Err(e)) => e.context("The queue poller failed"),
        Err(e) if e.is_panic() => anyhow!("The queue poller panicked: {}", e),
        Err(e) => anyhow!("The queue poller was cancelled: {}", e),
    }
}

/// The worker context: the queue, the storage holding the notified
/// objects, and the channel capacity between poller and consumer.
pub struct Worker<Q, S> {
    queue: Arc<Q>,
    store: Arc<S>,
    capacity: usize,
}

impl<Q, S> Worker<Q, S>
where
    Q: Queue + 'static,
    S: ObjectStore + 'static,
{
    pub fn new(queue: Arc<Q>, store: Arc<S>, capacity: usize) -> Self {
        Worker {
            queue,
            store,
            capacity: capacity.max(1),
        }
    }

    /// Prints a downloaded object.
    async fn emit(&self, object: &ObjectRef, data: &[u8]) {
        info!("Downloaded {:?} from bucket {:?}", &object.key, &object.bucket);
        let mut stdout = tokio::io::stdout();
        let written = async {
            stdout.write_all(data).await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!("Couldn't print the contents of {:?}: {:?}", &object.key, e);
        }
    }

    /// Parses the message and downloads every object it refers to.
    /// Returns the processed objects.
    pub async fn process(&self, message: &QueueMessage) -> Result<Vec<ObjectRef>> {
        let body = message
            .body
            .as_deref()
            .ok_or_else(|| anyhow!("Message has no body"))?;
        let objects = event::parse_body(body)?;
        for object in &objects {
            let data = self.store.download(&object.bucket, &object.key).await?;
            self.emit(object, &data).await;
        }
        Ok(objects)
    }

    /// Processes a message and deletes it if processing succeeded.
    /// A failed message stays in the queue and becomes visible again
    /// once its visibility timeout expires. Returns whether the
    /// message was deleted.
    #[instrument(skip(self, message), fields(id = ?message.id))]
    pub async fn handle(&self, message: QueueMessage) -> bool {
        if let Err(e) = self.process(&message).await {
            warn!("Couldn't process message; it won't be deleted: {:?}", e);
            return false;
        }
        match self.queue.delete(&message).await {
            Ok(()) => {
                info!("Deleted message");
                true
            }
            Err(e) => {
                warn!("Couldn't delete message: {:?}", e);
                false
            }
        }
    }

    /// Runs the poller and the consumer until `shutdown` completes.
    /// Fails if the poller stops on its own, so that a dead poller
    /// never leaves the process idling.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (sender, mut receiver) = mpsc::channel(self.capacity);
        let mut poller: JoinHandle<Result<()>> = tokio::spawn(poll(self.queue.clone(), sender));
        tokio::pin!(shutdown);
        let mut stop_requested = false;
        let finished = loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(message) => {
                        self.handle(message).await;
                    }
                    None => break None,
                },
                result = &mut poller => break Some(result),
                _ = &mut shutdown => {
                    stop_requested = true;
                    break None;
                }
            }
        };
        if stop_requested {
            info!("Stopping the queue worker");
            poller.abort();
            return Ok(());
        }
        let result = match finished {
            Some(result) => result,
            None => poller.await,
        };
        Err(poller_stopped(result))
    }
}
