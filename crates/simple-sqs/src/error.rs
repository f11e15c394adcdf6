//! Error types for queue operations.

use std::sync::Arc;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Receipt handle rejected (expired or unknown): {receipt}")]
    InvalidReceipt { receipt: String },

    #[error("{operation} failed for {} of {total} entries", .failures.len())]
    PartialBatchFailure {
        /// Name of the batched operation (`add_all`, `remove_all`, `poll`)
        operation: &'static str,
        /// Number of entries the caller submitted
        total: usize,
        /// Failed entries, by position in the caller's input
        failures: Vec<BatchEntryFailure>,
        /// Messages the operation did finish with: sent for `add_all`,
        /// acknowledged for `poll`, empty for `remove_all`.
        completed: Vec<crate::message::Message>,
    },

    #[error("{} received messages have bodies that are not JSON", .undecodable.len())]
    UndecodableMessages {
        /// Messages received in the same call whose bodies decoded
        decoded: Vec<crate::message::Message>,
        /// Messages whose bodies did not decode. Both lists are in flight
        /// and keep their receipts, so either can be passed to `remove_all`.
        undecodable: Vec<crate::message::RawMessage>,
    },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if error is transient and a caller-side retry may succeed.
    ///
    /// The client itself never retries.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => false,
            Self::BackendUnavailable { .. } => true,
            Self::QueueNotFound { .. } => false,
            Self::AuthenticationFailed { .. } => false,
            Self::InvalidReceipt { .. } => false,
            Self::PartialBatchFailure { failures, .. } => {
                failures.iter().all(|f| f.error.is_transient())
            }
            Self::UndecodableMessages { .. } => false,
            Self::ProviderError { .. } => true,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Indices of the failed entries when this is a partial batch failure
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            Self::PartialBatchFailure { failures, .. } => {
                failures.iter().map(|f| f.index).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// One failed element of a batched operation.
///
/// When a whole backend round trip fails, every element of that round trip
/// shares the same underlying error.
#[derive(Debug, Clone)]
pub struct BatchEntryFailure {
    /// Position of the element in the caller's input
    pub index: usize,
    pub error: Arc<QueueError>,
}

impl BatchEntryFailure {
    pub fn new(index: usize, error: QueueError) -> Self {
        Self::shared(index, Arc::new(error))
    }

    pub fn shared(index: usize, error: Arc<QueueError>) -> Self {
        Self { index, error }
    }
}

impl std::fmt::Display for BatchEntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element at position {}: {}", self.index, self.error)
    }
}

/// Errors during message serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors for caller-supplied values
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Invalid element at position {index}: {source}")]
    InvalidElement {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
