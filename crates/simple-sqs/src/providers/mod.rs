//! Queue backend implementations.
//!
//! This module contains concrete implementations of the [`QueueBackend`](crate::QueueBackend)
//! trait: the HTTP binding to AWS SQS and an in-memory backend for tests and
//! local development.

pub mod aws;
pub mod memory;

pub use aws::{AwsError, AwsSqsBackend};
pub use memory::{InMemoryBackend, InMemoryConfig};
