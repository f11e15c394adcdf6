//! Backend trait consumed by the queue client.
//!
//! A backend is a thin, stateless binding to the remote service. It never
//! splits batches, never waits for readiness and never retries; those
//! concerns belong to [`crate::Queue`].

use crate::error::QueueError;
use crate::message::{ApproximateCounts, QueueEndpoint, QueueName, RawMessage, SentMessage};
use async_trait::async_trait;

/// Maximum number of entries the backend accepts per batch call
pub const MAX_BATCH_SIZE: usize = 10;

/// One entry of a `send_message_batch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Caller-chosen identifier, unique within the batch
    pub client_token: String,
    /// Wire body (JSON text)
    pub body: String,
    pub delay_seconds: Option<u32>,
}

/// Per-entry outcome of a `send_message_batch` call
#[derive(Debug)]
pub struct BatchEntryResult {
    pub client_token: String,
    pub outcome: Result<SentMessage, QueueError>,
}

/// Interface implemented by queue service bindings (AWS SQS, in-memory)
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Resolve a queue name into its endpoint
    async fn resolve_endpoint(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError>;

    /// Send a single message
    async fn send_message(
        &self,
        endpoint: &QueueEndpoint,
        body: &str,
        delay_seconds: Option<u32>,
    ) -> Result<SentMessage, QueueError>;

    /// Send up to [`MAX_BATCH_SIZE`] messages in one round trip.
    ///
    /// Entries can fail individually; the result carries one outcome per
    /// submitted entry, keyed by client token.
    async fn send_message_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>, QueueError>;

    /// Receive up to `max_count` (1-10) messages, waiting at most
    /// `wait_seconds` (0-20) for one to become available
    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_count: u32,
        wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, QueueError>;

    /// Delete an in-flight message by receipt token
    async fn delete_message(&self, endpoint: &QueueEndpoint, receipt: &str)
        -> Result<(), QueueError>;

    /// Delete every message in the queue
    async fn purge_queue(&self, endpoint: &QueueEndpoint) -> Result<(), QueueError>;

    /// Approximate visible and in-flight message counts
    async fn approximate_counts(
        &self,
        endpoint: &QueueEndpoint,
    ) -> Result<ApproximateCounts, QueueError>;

    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;
}
