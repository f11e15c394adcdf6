//! Tests for the crate root re-exports.

use super::*;
use std::sync::Arc;

#[test]
fn test_queue_name_validation() {
    // Valid names
    assert!(QueueName::new("orders".to_string()).is_ok());
    assert!(QueueName::new("queue_123".to_string()).is_ok());
    assert!(QueueName::new("events.fifo".to_string()).is_ok());

    // Invalid names
    assert!(QueueName::new("".to_string()).is_err());
    assert!(QueueName::new("a".repeat(81)).is_err());
    assert!(QueueName::new("special@chars".to_string()).is_err());
}

#[test]
fn test_default_options() {
    let peek = PeekOptions::default();
    assert_eq!(peek.timeout_seconds, 0);
    assert_eq!(peek.limit, 1);
    assert_eq!(SendOptions::default().delay_seconds, None);
}

#[tokio::test]
async fn test_queue_over_in_memory_backend() {
    let backend = InMemoryBackend::default();
    let name = QueueName::new("lib-smoke".to_string()).unwrap();
    backend.create_queue(&name);

    let queue = Queue::new(name, Arc::new(backend)).unwrap();
    queue.add("hello", SendOptions::default()).await.unwrap();

    let message = queue.poll_one(PeekOptions::default()).await.unwrap().unwrap();
    assert_eq!(message.body, serde_json::json!("hello"));
    assert!(queue.is_empty().await.unwrap());
}
