//! Message types for queue operations including core domain identifiers.

use crate::error::{QueueError, SerializationError, ValidationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Maximum delivery delay accepted by the backend (15 minutes)
pub const MAX_DELAY_SECONDS: u32 = 900;

/// Long-poll ceiling of the backend
pub const MAX_WAIT_SECONDS: u32 = 20;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 80 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-80 characters".to_string(),
            });
        }

        // FIFO queues carry a ".fifo" suffix; the rest must be plain ASCII
        let base = name.strip_suffix(".fifo").unwrap_or(&name);
        if base.is_empty()
            || !base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the name designates a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(".fifo")
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Resolved address of a queue (the SQS queue URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEndpoint(String);

impl QueueEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a backend-assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque, single-use token for acknowledging a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle; the token must not be empty
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }
        Ok(Self(handle))
    }

    /// Wrap a token freshly issued by a backend
    pub(crate) fn issued(handle: String) -> Self {
        debug_assert!(!handle.is_empty(), "backends never issue empty receipts");
        Self(handle)
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message as seen by the caller.
///
/// Messages returned by `add`/`add_all` carry no receipt handle; messages
/// returned by `peek`/`poll` do, and only those can be removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: Value,
    /// Integrity checksum reported by the backend (opaque)
    pub digest: String,
    pub receipt: Option<ReceiptHandle>,
}

impl Message {
    /// Build the caller-side view of a message the backend just accepted
    pub(crate) fn sent(id: MessageId, body: Value, digest: String) -> Self {
        Self {
            id,
            body,
            digest,
            receipt: None,
        }
    }

    /// Decode a message retrieved from the backend; the wire body is JSON.
    ///
    /// On failure the raw message is handed back together with the parse
    /// error, so its receipt is not lost.
    pub(crate) fn received(raw: RawMessage) -> Result<Self, (RawMessage, SerializationError)> {
        match serde_json::from_str(&raw.body) {
            Ok(body) => Ok(Self {
                id: raw.id,
                body,
                digest: raw.digest,
                receipt: Some(raw.receipt),
            }),
            Err(e) => Err((raw, SerializationError::from(e))),
        }
    }

    /// Deserialize the body into a caller type
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| QueueError::Serialization(SerializationError::from(e)))
    }

    /// Receipt handle, if this message came from a retrieval
    pub fn receipt(&self) -> Option<&ReceiptHandle> {
        self.receipt.as_ref()
    }
}

/// A message exactly as returned by a backend receive call
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: MessageId,
    /// Wire body (JSON text)
    pub body: String,
    pub digest: String,
    pub receipt: ReceiptHandle,
}

/// Result of a single accepted send
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: MessageId,
    pub digest: String,
}

/// Approximate message counts reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApproximateCounts {
    pub visible: u64,
    pub in_flight: u64,
}

impl ApproximateCounts {
    pub fn total(&self) -> u64 {
        self.visible.saturating_add(self.in_flight)
    }
}

/// Encode a caller payload into its JSON value and wire body.
///
/// Accepted payloads are numbers, strings, booleans, objects and null.
pub(crate) fn encode_payload<T: Serialize + ?Sized>(
    payload: &T,
) -> Result<(Value, String), QueueError> {
    let value = serde_json::to_value(payload).map_err(|e| ValidationError::InvalidFormat {
        field: "payload".to_string(),
        message: format!("not serializable: {}", e),
    })?;

    if value.is_array() {
        return Err(ValidationError::InvalidFormat {
            field: "payload".to_string(),
            message: "expected number, string, boolean, object or null, received array"
                .to_string(),
        }
        .into());
    }

    let body = serde_json::to_string(&value).map_err(SerializationError::from)?;
    Ok((value, body))
}

// ============================================================================
// Receipt extraction
// ============================================================================

/// Anything a receipt token can be extracted from: a retrieved [`Message`],
/// a [`ReceiptHandle`], or a raw token string.
pub trait ReceiptSource {
    /// The non-empty receipt token, if this value carries one
    fn receipt_token(&self) -> Option<&str>;
}

impl ReceiptSource for Message {
    fn receipt_token(&self) -> Option<&str> {
        self.receipt.as_ref().map(|r| r.handle())
    }
}

impl ReceiptSource for RawMessage {
    fn receipt_token(&self) -> Option<&str> {
        Some(self.receipt.handle())
    }
}

impl ReceiptSource for ReceiptHandle {
    fn receipt_token(&self) -> Option<&str> {
        Some(self.handle())
    }
}

impl ReceiptSource for str {
    fn receipt_token(&self) -> Option<&str> {
        Some(self).filter(|s| !s.is_empty())
    }
}

impl ReceiptSource for String {
    fn receipt_token(&self) -> Option<&str> {
        self.as_str().receipt_token()
    }
}

impl<T: ReceiptSource + ?Sized> ReceiptSource for &T {
    fn receipt_token(&self) -> Option<&str> {
        (**self).receipt_token()
    }
}

impl<T: ReceiptSource> ReceiptSource for Option<T> {
    fn receipt_token(&self) -> Option<&str> {
        self.as_ref().and_then(|r| r.receipt_token())
    }
}

/// Extract the receipt token or fail with a validation error
pub(crate) fn extract_receipt<R: ReceiptSource + ?Sized>(
    source: &R,
) -> Result<&str, ValidationError> {
    source
        .receipt_token()
        .ok_or_else(|| ValidationError::InvalidFormat {
            field: "message".to_string(),
            message: "expected a receipt token or a message with a receipt handle".to_string(),
        })
}

// ============================================================================
// Send and Peek Options
// ============================================================================

/// Options for `add` and `add_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Seconds (0-900) to delay delivery; `None` uses the queue default
    pub delay_seconds: Option<u32>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set delivery delay in seconds
    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        match self.delay_seconds {
            Some(delay) if delay > MAX_DELAY_SECONDS => Err(ValidationError::OutOfRange {
                field: "delay_seconds".to_string(),
                message: format!("must be between 0 and {}, got {}", MAX_DELAY_SECONDS, delay),
            }),
            _ => Ok(()),
        }
    }
}

/// Options for `peek`, `poll` and their single-message variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekOptions {
    /// Seconds (0-20) the backend may wait for a message to arrive
    pub timeout_seconds: u32,
    /// Maximum number of messages to return; values above 10 are batched
    pub limit: u32,
}

impl Default for PeekOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            limit: 1,
        }
    }
}

impl PeekOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set long-poll wait in seconds
    pub fn with_timeout_seconds(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set maximum number of messages
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_seconds > MAX_WAIT_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "timeout_seconds".to_string(),
                message: format!(
                    "must be between 0 and {}, got {}",
                    MAX_WAIT_SECONDS, self.timeout_seconds
                ),
            });
        }

        if self.limit == 0 {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
