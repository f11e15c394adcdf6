//! In-memory queue backend for testing and development.
//!
//! This module provides a fully functional in-memory backend that:
//! - Stores messages in FIFO order per queue
//! - Honours delivery delays and long-poll waits
//! - Implements visibility timeouts with single-use receipt handles
//! - Reports approximate counts the way the remote service does
//! - Provides thread-safe concurrent access
//!
//! Queues must be created with [`InMemoryBackend::create_queue`] before a
//! client can resolve them.

use crate::backend::{BatchEntry, BatchEntryResult, QueueBackend, MAX_BATCH_SIZE};
use crate::error::QueueError;
use crate::message::{
    ApproximateCounts, MessageId, QueueEndpoint, QueueName, RawMessage, ReceiptHandle,
    SentMessage, MAX_WAIT_SECONDS,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::Notify;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Interval at which a long-polling receive re-checks for delayed messages
const WAIT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// In-memory backend configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long a received message stays hidden before it is delivered again
    pub visibility_timeout: Duration,
    /// Maximum body size in bytes
    pub max_message_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::seconds(30),
            max_message_size: 256 * 1024,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Storage for all queues, keyed by endpoint
#[derive(Default)]
struct QueueStorage {
    endpoints: HashMap<QueueName, QueueEndpoint>,
    queues: HashMap<QueueEndpoint, InMemoryQueue>,
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Waiting messages (FIFO order), including delayed ones
    messages: VecDeque<StoredMessage>,
    /// In-flight messages keyed by receipt token
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    /// Return messages whose visibility timeout elapsed to the queue
    fn release_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_front(in_flight.message);
            }
        }
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    digest: String,
    available_at: DateTime<Utc>,
}

impl StoredMessage {
    fn new(body: &str, delay_seconds: Option<u32>) -> Self {
        let now = Utc::now();
        let delay = Duration::seconds(i64::from(delay_seconds.unwrap_or(0)));
        Self {
            message_id: new_message_id(),
            body: body.to_string(),
            digest: body_digest(body),
            available_at: now + delay,
        }
    }

    fn is_available(&self, now: DateTime<Utc>) -> bool {
        now >= self.available_at
    }
}

/// A message delivered to a consumer and not yet deleted
struct InFlightMessage {
    message: StoredMessage,
    visible_at: DateTime<Utc>,
}

fn new_message_id() -> MessageId {
    MessageId::new(uuid::Uuid::new_v4().to_string())
}

/// Hex SHA-256 of the wire body
pub fn body_digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

// ============================================================================
// InMemoryBackend
// ============================================================================

/// In-memory queue backend implementation
pub struct InMemoryBackend {
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
    arrivals: Arc<Notify>,
}

impl InMemoryBackend {
    /// Create new in-memory backend with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::default())),
            config,
            arrivals: Arc::new(Notify::new()),
        }
    }

    /// Create a queue (idempotent) and return its endpoint
    pub fn create_queue(&self, name: &QueueName) -> QueueEndpoint {
        let mut storage = self.write();
        if let Some(endpoint) = storage.endpoints.get(name) {
            return endpoint.clone();
        }

        let endpoint = QueueEndpoint::new(format!("memory://queues/{}", name));
        storage.endpoints.insert(name.clone(), endpoint.clone());
        storage
            .queues
            .insert(endpoint.clone(), InMemoryQueue::default());
        endpoint
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueStorage> {
        self.storage
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the queue behind `endpoint`
    fn with_queue<R>(
        &self,
        endpoint: &QueueEndpoint,
        f: impl FnOnce(&mut InMemoryQueue) -> R,
    ) -> Result<R, QueueError> {
        let mut storage = self.write();
        let queue = storage
            .queues
            .get_mut(endpoint)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: endpoint.to_string(),
            })?;
        Ok(f(queue))
    }

    fn check_size(&self, body: &str) -> Result<(), QueueError> {
        if body.len() > self.config.max_message_size {
            return Err(QueueError::ProviderError {
                provider: "InMemory".to_string(),
                code: "MessageTooLong".to_string(),
                message: format!(
                    "message body is {} bytes (max: {})",
                    body.len(),
                    self.config.max_message_size
                ),
            });
        }
        Ok(())
    }

    /// Move up to `max_count` available messages in flight
    fn take_available(
        &self,
        endpoint: &QueueEndpoint,
        max_count: u32,
    ) -> Result<Vec<RawMessage>, QueueError> {
        let visibility_timeout = self.config.visibility_timeout;
        self.with_queue(endpoint, |queue| {
            let now = Utc::now();
            queue.release_expired(now);

            let mut taken = Vec::new();
            let mut remaining = VecDeque::with_capacity(queue.messages.len());
            while let Some(message) = queue.messages.pop_front() {
                if taken.len() < max_count as usize && message.is_available(now) {
                    taken.push(message);
                } else {
                    remaining.push_back(message);
                }
            }
            queue.messages = remaining;

            taken
                .into_iter()
                .map(|message| {
                    let token = uuid::Uuid::new_v4().to_string();
                    let raw = RawMessage {
                        id: message.message_id.clone(),
                        body: message.body.clone(),
                        digest: message.digest.clone(),
                        receipt: ReceiptHandle::issued(token.clone()),
                    };
                    queue.in_flight.insert(
                        token,
                        InFlightMessage {
                            message,
                            visible_at: now + visibility_timeout,
                        },
                    );
                    raw
                })
                .collect()
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn resolve_endpoint(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        let storage = self
            .storage
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        storage
            .endpoints
            .get(queue)
            .cloned()
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    async fn send_message(
        &self,
        endpoint: &QueueEndpoint,
        body: &str,
        delay_seconds: Option<u32>,
    ) -> Result<SentMessage, QueueError> {
        self.check_size(body)?;
        let stored = StoredMessage::new(body, delay_seconds);
        let sent = SentMessage {
            id: stored.message_id.clone(),
            digest: stored.digest.clone(),
        };

        self.with_queue(endpoint, |queue| queue.messages.push_back(stored))?;
        self.arrivals.notify_waiters();
        Ok(sent)
    }

    async fn send_message_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>, QueueError> {
        if entries.is_empty() || entries.len() > MAX_BATCH_SIZE {
            return Err(QueueError::ProviderError {
                provider: "InMemory".to_string(),
                code: "InvalidBatchSize".to_string(),
                message: format!(
                    "batch must hold 1-{} entries, got {}",
                    MAX_BATCH_SIZE,
                    entries.len()
                ),
            });
        }

        let distinct: HashSet<&str> = entries.iter().map(|e| e.client_token.as_str()).collect();
        if distinct.len() != entries.len() {
            return Err(QueueError::ProviderError {
                provider: "InMemory".to_string(),
                code: "BatchEntryIdsNotDistinct".to_string(),
                message: "batch entry ids must be unique".to_string(),
            });
        }

        let mut accepted = Vec::new();
        let results: Vec<BatchEntryResult> = entries
            .iter()
            .map(|entry| {
                let outcome = self.check_size(&entry.body).map(|()| {
                    let stored = StoredMessage::new(&entry.body, entry.delay_seconds);
                    let sent = SentMessage {
                        id: stored.message_id.clone(),
                        digest: stored.digest.clone(),
                    };
                    accepted.push(stored);
                    sent
                });
                BatchEntryResult {
                    client_token: entry.client_token.clone(),
                    outcome,
                }
            })
            .collect();

        self.with_queue(endpoint, |queue| queue.messages.extend(accepted))?;
        self.arrivals.notify_waiters();
        Ok(results)
    }

    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_count: u32,
        wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, QueueError> {
        let max_count = max_count.clamp(1, MAX_BATCH_SIZE as u32);
        let wait = std::time::Duration::from_secs(u64::from(wait_seconds.min(MAX_WAIT_SECONDS)));
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register interest before checking so a send in between is not missed
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let taken = self.take_available(endpoint, max_count)?;
            let now = tokio::time::Instant::now();
            if !taken.is_empty() || now >= deadline {
                return Ok(taken);
            }

            let remaining = (deadline - now).min(WAIT_POLL_INTERVAL);
            let _ = tokio::time::timeout(remaining, arrival).await;
        }
    }

    async fn delete_message(
        &self,
        endpoint: &QueueEndpoint,
        receipt: &str,
    ) -> Result<(), QueueError> {
        let removed = self.with_queue(endpoint, |queue| {
            queue.release_expired(Utc::now());
            queue.in_flight.remove(receipt).is_some()
        })?;

        if removed {
            Ok(())
        } else {
            Err(QueueError::InvalidReceipt {
                receipt: receipt.to_string(),
            })
        }
    }

    async fn purge_queue(&self, endpoint: &QueueEndpoint) -> Result<(), QueueError> {
        self.with_queue(endpoint, |queue| {
            queue.messages.clear();
            queue.in_flight.clear();
        })
    }

    async fn approximate_counts(
        &self,
        endpoint: &QueueEndpoint,
    ) -> Result<ApproximateCounts, QueueError> {
        self.with_queue(endpoint, |queue| {
            let now = Utc::now();
            queue.release_expired(now);
            ApproximateCounts {
                visible: queue.messages.iter().filter(|m| m.is_available(now)).count() as u64,
                in_flight: queue.in_flight.len() as u64,
            }
        })
    }

    fn name(&self) -> &'static str {
        "InMemory"
    }
}
