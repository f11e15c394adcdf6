//! Integration tests for transparent batch splitting over HTTP

mod common;

use simple_sqs::{PeekOptions, SendOptions};

/// Verify that 25 messages are sent as three batch requests in order
#[tokio::test]
async fn test_add_all_splits_into_batches() {
    common::init_tracing();
    let (queue, server) = common::fake_sqs_queue().await;
    let items: Vec<u32> = (0..25).collect();

    let added = queue.add_all(&items, SendOptions::default()).await.unwrap();
    let bodies: Vec<u64> = added.iter().map(|m| m.body.as_u64().unwrap()).collect();
    assert_eq!(bodies, (0..25).collect::<Vec<u64>>());

    let actions = common::received_actions(&server).await;
    assert_eq!(
        actions.iter().filter(|a| *a == "SendMessageBatch").count(),
        3
    );
    assert_eq!(queue.size().await.unwrap(), 25);
}

/// Verify that exactly ten messages go out in a single request
#[tokio::test]
async fn test_add_all_single_batch() {
    let (queue, server) = common::fake_sqs_queue().await;
    let items: Vec<u32> = (0..10).collect();

    queue.add_all(&items, SendOptions::default()).await.unwrap();

    let actions = common::received_actions(&server).await;
    assert_eq!(
        actions.iter().filter(|a| *a == "SendMessageBatch").count(),
        1
    );
}

/// Verify that an empty add_all never reaches the service
#[tokio::test]
async fn test_add_all_empty() {
    let (queue, server) = common::fake_sqs_queue().await;
    queue.endpoint().await.unwrap();

    let added = queue
        .add_all(&Vec::<u32>::new(), SendOptions::default())
        .await
        .unwrap();

    assert!(added.is_empty());
    assert_eq!(common::received_actions(&server).await, vec!["GetQueueUrl"]);
}

/// Verify that peeking above ten issues concurrent receives
#[tokio::test]
async fn test_peek_above_batch_limit() {
    let (queue, server) = common::fake_sqs_queue().await;
    let items: Vec<u32> = (0..23).collect();
    queue.add_all(&items, SendOptions::default()).await.unwrap();

    let peeked = queue.peek(PeekOptions::new().with_limit(23)).await.unwrap();
    assert_eq!(peeked.len(), 23);

    let actions = common::received_actions(&server).await;
    assert_eq!(
        actions.iter().filter(|a| *a == "ReceiveMessage").count(),
        3
    );

    queue.remove_all(&peeked).await.unwrap();
    assert!(queue.is_empty().await.unwrap());
}
