//! Queue client: the high-level operation set over a [`QueueBackend`].
//!
//! Every operation validates its arguments first, then waits on the
//! readiness gate for the queue endpoint, and only then calls the backend.
//! Invalid arguments therefore never cost a round trip, and operations
//! issued before the endpoint is known are deferred instead of failing.

use crate::backend::{BatchEntry, QueueBackend, MAX_BATCH_SIZE};
use crate::batch;
use crate::config::QueueConfig;
use crate::error::{BatchEntryFailure, QueueError, ValidationError};
use crate::gate::ReadinessGate;
use crate::message::{
    encode_payload, extract_receipt, ApproximateCounts, Message, PeekOptions, QueueEndpoint,
    QueueName, RawMessage, ReceiptSource, SendOptions,
};
use crate::providers::AwsSqsBackend;
use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// A client bound to one remote queue.
///
/// Construction starts resolving the queue endpoint in the background and
/// returns immediately. Cloning is cheap; clones share the backend and the
/// resolved endpoint.
#[derive(Clone)]
pub struct Queue {
    name: QueueName,
    backend: Arc<dyn QueueBackend>,
    gate: ReadinessGate<QueueEndpoint>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .field("ready", &self.gate.is_ready())
            .finish()
    }
}

impl Queue {
    /// Bind a client to `name` on `backend`.
    ///
    /// Must be called from within a Tokio runtime; endpoint resolution runs
    /// on a spawned task.
    pub fn new(name: QueueName, backend: Arc<dyn QueueBackend>) -> Result<Self, QueueError> {
        let resolver_backend = Arc::clone(&backend);
        let resolver_name = name.clone();

        let gate = ReadinessGate::spawn(async move {
            match resolver_backend.resolve_endpoint(&resolver_name).await {
                Ok(endpoint) => {
                    info!(queue = %resolver_name, endpoint = %endpoint, "Queue endpoint resolved");
                    Ok(endpoint)
                }
                Err(e) => {
                    error!(queue = %resolver_name, error = %e, "Failed to resolve queue endpoint");
                    Err(e)
                }
            }
        })?;

        Ok(Self {
            name,
            backend,
            gate,
        })
    }

    /// Validate `config` and bind a client backed by the HTTP SQS backend
    pub fn connect(config: QueueConfig) -> Result<Self, QueueError> {
        let name = config.queue_name()?;
        let backend = AwsSqsBackend::new(config)?;
        Self::new(name, Arc::new(backend))
    }

    /// Queue name this client is bound to
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Check if the endpoint has been resolved
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Resolved endpoint (queue URL), waiting for resolution if needed
    pub async fn endpoint(&self) -> Result<QueueEndpoint, QueueError> {
        self.gate.wait().await
    }

    /// Approximate visible and in-flight counts
    #[instrument(skip(self), fields(queue = %self.name))]
    pub async fn approximate_counts(&self) -> Result<ApproximateCounts, QueueError> {
        let endpoint = self.gate.wait().await?;
        self.backend.approximate_counts(&endpoint).await
    }

    /// Approximate number of messages, visible plus in flight
    pub async fn size(&self) -> Result<u64, QueueError> {
        Ok(self.approximate_counts().await?.total())
    }

    /// Check if [`size`](Self::size) is zero
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.size().await? == 0)
    }

    /// Append one message carrying `payload` at the tail of the queue.
    ///
    /// The payload must serialize to a JSON number, string, boolean, object
    /// or null.
    #[instrument(skip(self, payload), fields(queue = %self.name))]
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        options: SendOptions,
    ) -> Result<Message, QueueError> {
        let (value, body) = encode_payload(payload)?;
        options.validate()?;

        let endpoint = self.gate.wait().await?;
        let sent = self
            .backend
            .send_message(&endpoint, &body, options.delay_seconds)
            .await?;

        debug!(message_id = %sent.id, "Message added");
        Ok(Message::sent(sent.id, value, sent.digest))
    }

    /// Append one message per item, in batches of at most ten.
    ///
    /// Returns the created messages in input order. If any item fails the
    /// result is `PartialBatchFailure` listing each failed position; the
    /// items that were accepted stay in the queue and are reported as
    /// `completed`.
    #[instrument(skip(self, items), fields(queue = %self.name, count = items.len()))]
    pub async fn add_all<T: Serialize>(
        &self,
        items: &[T],
        options: SendOptions,
    ) -> Result<Vec<Message>, QueueError> {
        options.validate()?;
        let encoded = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                encode_payload(item).map_err(|e| match e {
                    QueueError::InvalidArgument(source) => {
                        QueueError::InvalidArgument(ValidationError::InvalidElement {
                            index,
                            source: Box::new(source),
                        })
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if encoded.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = self.gate.wait().await?;
        let total = encoded.len();
        let delay_seconds = options.delay_seconds;

        let outcomes = batch::run_partitioned(encoded, MAX_BATCH_SIZE, |chunk| {
            self.send_chunk(&endpoint, chunk, delay_seconds)
        })
        .await;

        let (completed, failures) = batch::collect_entries(outcomes);
        if failures.is_empty() {
            return Ok(completed);
        }

        warn!(
            failed = failures.len(),
            total, "Some messages could not be added"
        );
        Err(QueueError::PartialBatchFailure {
            operation: "add_all",
            total,
            failures,
            completed,
        })
    }

    /// Send one chunk and map per-entry results back to chunk order
    async fn send_chunk(
        &self,
        endpoint: &QueueEndpoint,
        chunk: Vec<(Value, String)>,
        delay_seconds: Option<u32>,
    ) -> Result<Vec<Result<Message, QueueError>>, QueueError> {
        let entries: Vec<BatchEntry> = chunk
            .iter()
            .map(|(_, body)| BatchEntry {
                client_token: uuid::Uuid::new_v4().to_string(),
                body: body.clone(),
                delay_seconds,
            })
            .collect();

        let mut results = self.backend.send_message_batch(endpoint, &entries).await?;
        debug!(entries = entries.len(), "Batch sent");

        let mapped = entries
            .iter()
            .zip(chunk)
            .map(|(entry, (value, _))| {
                let position = results
                    .iter()
                    .position(|r| r.client_token == entry.client_token);
                match position {
                    Some(position) => results
                        .swap_remove(position)
                        .outcome
                        .map(|sent| Message::sent(sent.id, value, sent.digest)),
                    None => Err(QueueError::ProviderError {
                        provider: self.backend.name().to_string(),
                        code: "MissingBatchResult".to_string(),
                        message: format!("no result reported for entry {}", entry.client_token),
                    }),
                }
            })
            .collect();

        Ok(mapped)
    }

    /// Retrieve, without deleting, up to `options.limit` messages.
    ///
    /// Retrieved messages become in flight: hidden from other consumers
    /// until removed or until their visibility timeout elapses. Limits above
    /// ten are split into receive calls, at most
    /// [`MAX_CONCURRENT_CHUNKS`](crate::batch::MAX_CONCURRENT_CHUNKS) at a
    /// time. If any of them fails the whole call fails and messages already
    /// received return to the queue after their visibility timeout.
    ///
    /// A received body that is not JSON fails the call with
    /// `UndecodableMessages`, which carries every message of the call with
    /// its receipt.
    #[instrument(skip(self), fields(queue = %self.name))]
    pub async fn peek(&self, options: PeekOptions) -> Result<Vec<Message>, QueueError> {
        options.validate()?;
        let endpoint = self.gate.wait().await?;
        let wait_seconds = options.timeout_seconds;

        let outcomes = batch::run_counted(options.limit as usize, MAX_BATCH_SIZE, |count| {
            self.backend
                .receive_messages(&endpoint, count as u32, wait_seconds)
        });
        tokio::pin!(outcomes);

        let mut received = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            match outcome.result {
                Ok(raw) => {
                    debug!(requested = outcome.len, received = raw.len(), "Messages received");
                    received.extend(raw);
                }
                Err(e) => {
                    if !received.is_empty() {
                        warn!(
                            discarded = received.len(),
                            "Receive failed; messages already received stay in flight until their visibility timeout"
                        );
                    }
                    return Err(e);
                }
            }
        }

        decode_received(received)
    }

    /// Retrieve, without deleting, the message at the head of the queue.
    ///
    /// `options.limit` is ignored. Returns `None` when no message was
    /// available within the wait.
    pub async fn peek_one(&self, options: PeekOptions) -> Result<Option<Message>, QueueError> {
        let messages = self.peek(options.with_limit(1)).await?;
        Ok(messages.into_iter().next())
    }

    /// Delete an in-flight message.
    ///
    /// Accepts a retrieved [`Message`], a [`ReceiptHandle`](crate::ReceiptHandle)
    /// or a raw receipt token. Removing twice with the same receipt is
    /// backend-defined and may fail.
    #[instrument(skip(self, message), fields(queue = %self.name))]
    pub async fn remove<R: ReceiptSource + ?Sized>(&self, message: &R) -> Result<(), QueueError> {
        let receipt = extract_receipt(message)?;
        let endpoint = self.gate.wait().await?;
        self.backend.delete_message(&endpoint, receipt).await?;
        debug!("Message removed");
        Ok(())
    }

    /// Delete several in-flight messages concurrently.
    ///
    /// Every element is validated before any delete is issued. Failed
    /// deletes do not cancel the others; they are reported together as
    /// `PartialBatchFailure` with their positions.
    #[instrument(skip(self, messages), fields(queue = %self.name, count = messages.len()))]
    pub async fn remove_all<R: ReceiptSource>(&self, messages: &[R]) -> Result<(), QueueError> {
        let receipts = messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                extract_receipt(message).map_err(|source| ValidationError::InvalidElement {
                    index,
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if receipts.is_empty() {
            return Ok(());
        }

        let endpoint = self.gate.wait().await?;
        let results = join_all(
            receipts
                .iter()
                .map(|receipt| self.backend.delete_message(&endpoint, receipt)),
        )
        .await;

        let failures: Vec<BatchEntryFailure> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| result.err().map(|e| BatchEntryFailure::new(index, e)))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        Err(QueueError::PartialBatchFailure {
            operation: "remove_all",
            total: receipts.len(),
            failures,
            completed: Vec::new(),
        })
    }

    /// Retrieve and delete up to `options.limit` messages.
    ///
    /// Messages are returned only once their delete has completed. When a
    /// delete fails the message stays in flight and may be delivered again
    /// after its visibility timeout; the call then fails with
    /// `PartialBatchFailure`, whose `completed` holds the messages that were
    /// deleted. An undecodable body fails the call with `UndecodableMessages`
    /// before any delete is issued.
    #[instrument(skip(self), fields(queue = %self.name))]
    pub async fn poll(&self, options: PeekOptions) -> Result<Vec<Message>, QueueError> {
        let messages = self.peek(options).await?;
        if messages.is_empty() {
            return Ok(messages);
        }

        let results = join_all(messages.iter().map(|message| self.remove(message))).await;

        let total = messages.len();
        let mut completed = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, (message, result)) in messages.into_iter().zip(results).enumerate() {
            match result {
                Ok(()) => completed.push(message),
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "Failed to remove polled message; it may be delivered again"
                    );
                    failures.push(BatchEntryFailure::new(index, e));
                }
            }
        }

        if failures.is_empty() {
            return Ok(completed);
        }

        Err(QueueError::PartialBatchFailure {
            operation: "poll",
            total,
            failures,
            completed,
        })
    }

    /// Retrieve and delete the message at the head of the queue.
    ///
    /// Returns `None` when no message was available within the wait. If the
    /// delete fails the delete error is returned and the message may be
    /// delivered again after its visibility timeout.
    pub async fn poll_one(&self, options: PeekOptions) -> Result<Option<Message>, QueueError> {
        let Some(message) = self.peek_one(options).await? else {
            return Ok(None);
        };

        if let Err(e) = self.remove(&message).await {
            warn!(
                queue = %self.name,
                message_id = %message.id,
                error = %e,
                "Failed to remove polled message; it may be delivered again"
            );
            return Err(e);
        }

        Ok(Some(message))
    }

    /// Delete every message in the queue. Irreversible.
    #[instrument(skip(self), fields(queue = %self.name))]
    pub async fn clear(&self) -> Result<(), QueueError> {
        let endpoint = self.gate.wait().await?;
        self.backend.purge_queue(&endpoint).await?;
        info!("Queue purged");
        Ok(())
    }
}

/// Decode received messages, keeping undecodable ones reportable
fn decode_received(received: Vec<RawMessage>) -> Result<Vec<Message>, QueueError> {
    let mut decoded = Vec::with_capacity(received.len());
    let mut undecodable = Vec::new();
    for raw in received {
        match Message::received(raw) {
            Ok(message) => decoded.push(message),
            Err((raw, e)) => {
                warn!(message_id = %raw.id, error = %e, "Received message body is not JSON");
                undecodable.push(raw);
            }
        }
    }

    if undecodable.is_empty() {
        return Ok(decoded);
    }
    Err(QueueError::UndecodableMessages {
        decoded,
        undecodable,
    })
}
