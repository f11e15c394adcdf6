//! # Simple SQS
//!
//! A small, batteries-included client for visibility-timeout message queues
//! such as AWS SQS.
//!
//! This library provides:
//! - Immediate client construction with deferred endpoint resolution
//! - JSON message bodies for any `serde` payload that is not an array
//! - Transparent splitting of batch operations above the backend limit of ten
//! - Peek/remove and poll (peek-then-remove) consumption
//! - A pull-based [`futures::Stream`] of message bodies
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures, identifiers and operation options
//! - [`config`] - Client configuration loaded from files and the environment
//! - [`backend`] - The trait implemented by queue service bindings
//! - [`providers`] - AWS SQS and in-memory backends
//! - [`queue`] - The high-level [`Queue`] client
//! - [`stream`] - Streaming consumption
//!
//! ## Example
//!
//! ```no_run
//! use simple_sqs::{PeekOptions, Queue, QueueConfig, SendOptions};
//!
//! # async fn run() -> Result<(), simple_sqs::QueueError> {
//! let config = QueueConfig::new("orders").with_credentials("AKIA...", "secret");
//! let queue = Queue::connect(config)?;
//!
//! queue.add(&serde_json::json!({ "order": 42 }), SendOptions::default()).await?;
//! if let Some(message) = queue.poll_one(PeekOptions::default()).await? {
//!     println!("{}", message.body);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod gate;
pub mod message;
pub mod providers;
pub mod queue;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use backend::{BatchEntry, BatchEntryResult, QueueBackend, MAX_BATCH_SIZE};
pub use config::QueueConfig;
pub use error::{
    BatchEntryFailure, ConfigurationError, QueueError, SerializationError, ValidationError,
};
pub use gate::{GateOpener, ReadinessGate};
pub use message::{
    ApproximateCounts, Message, MessageId, PeekOptions, QueueEndpoint, QueueName, RawMessage,
    ReceiptHandle, ReceiptSource, SendOptions, SentMessage, MAX_DELAY_SECONDS, MAX_WAIT_SECONDS,
};
pub use providers::{AwsSqsBackend, InMemoryBackend, InMemoryConfig};
pub use queue::Queue;
pub use stream::MessageStream;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
