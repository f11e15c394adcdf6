//! Common test utilities for simple-sqs integration tests
//!
//! This module provides:
//! - Queues backed by the in-memory backend
//! - [`FakeSqs`], a stateful `wiremock` responder speaking the SQS Query API
//! - Tracing setup for debugging test runs (`RUST_LOG=simple_sqs=debug`)

use simple_sqs::{InMemoryBackend, Queue, QueueConfig, QueueName};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const QUEUE_NAME: &str = "orders";

/// Install a test subscriber once; later calls are no-ops
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Queue bound to a fresh in-memory backend
#[allow(dead_code)]
pub fn memory_queue() -> (Queue, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::default());
    let name = QueueName::new(QUEUE_NAME.to_string()).unwrap();
    backend.create_queue(&name);
    let queue = Queue::new(name, backend.clone()).unwrap();
    (queue, backend)
}

/// Start a mock SQS endpoint and connect a queue to it
#[allow(dead_code)]
pub async fn fake_sqs_queue() -> (Queue, MockServer) {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(FakeSqs::default())
        .mount(&server)
        .await;

    let config = QueueConfig::new(QUEUE_NAME)
        .with_credentials("AKIDEXAMPLE", "secret")
        .with_endpoint_url(server.uri());
    let queue = Queue::connect(config).unwrap();
    (queue, server)
}

/// Actions received by `server`, in arrival order
#[allow(dead_code)]
pub async fn received_actions(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| query(request).remove("Action"))
        .collect()
}

// ============================================================================
// Fake SQS
// ============================================================================

#[derive(Default)]
struct FakeQueue {
    visible: VecDeque<(String, String)>,
    in_flight: HashMap<String, (String, String)>,
}

/// Minimal stateful SQS: one queue named [`QUEUE_NAME`], no visibility timeout
#[derive(Default, Clone)]
pub struct FakeSqs {
    queue: Arc<Mutex<FakeQueue>>,
}

impl Respond for FakeSqs {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let params = query(request);
        let action = params.get("Action").map(String::as_str).unwrap_or_default();
        let queue_url = format!("{}/000000000000/{}", base_url(request), QUEUE_NAME);
        let mut queue = self.queue.lock().unwrap();

        if action != "GetQueueUrl" && params.get("QueueUrl") != Some(&queue_url) {
            return error("AWS.SimpleQueueService.NonExistentQueue", "no such queue");
        }

        match action {
            "GetQueueUrl" => {
                if params.get("QueueName").map(String::as_str) != Some(QUEUE_NAME) {
                    return error("AWS.SimpleQueueService.NonExistentQueue", "no such queue");
                }
                ok(format!(
                    "<GetQueueUrlResponse><GetQueueUrlResult><QueueUrl>{}</QueueUrl>\
                     </GetQueueUrlResult></GetQueueUrlResponse>",
                    queue_url
                ))
            }
            "SendMessage" => {
                let id = uuid::Uuid::new_v4().to_string();
                queue
                    .visible
                    .push_back((id.clone(), params["MessageBody"].clone()));
                ok(format!(
                    "<SendMessageResponse><SendMessageResult><MessageId>{}</MessageId>\
                     <MD5OfMessageBody>x</MD5OfMessageBody></SendMessageResult></SendMessageResponse>",
                    id
                ))
            }
            "SendMessageBatch" => {
                let mut entries = String::new();
                for n in 1..=10 {
                    let prefix = format!("SendMessageBatchRequestEntry.{}", n);
                    let Some(entry_id) = params.get(&format!("{}.Id", prefix)) else {
                        break;
                    };
                    let id = uuid::Uuid::new_v4().to_string();
                    let body = params[&format!("{}.MessageBody", prefix)].clone();
                    queue.visible.push_back((id.clone(), body));
                    entries.push_str(&format!(
                        "<SendMessageBatchResultEntry><Id>{}</Id><MessageId>{}</MessageId>\
                         <MD5OfMessageBody>x</MD5OfMessageBody></SendMessageBatchResultEntry>",
                        entry_id, id
                    ));
                }
                ok(format!(
                    "<SendMessageBatchResponse><SendMessageBatchResult>{}\
                     </SendMessageBatchResult></SendMessageBatchResponse>",
                    entries
                ))
            }
            "ReceiveMessage" => {
                let max: usize = params["MaxNumberOfMessages"].parse().unwrap_or(1);
                let mut messages = String::new();
                for _ in 0..max {
                    let Some((id, body)) = queue.visible.pop_front() else {
                        break;
                    };
                    let receipt = uuid::Uuid::new_v4().to_string();
                    messages.push_str(&format!(
                        "<Message><MessageId>{}</MessageId><ReceiptHandle>{}</ReceiptHandle>\
                         <MD5OfBody>x</MD5OfBody><Body>{}</Body></Message>",
                        id,
                        receipt,
                        escape(&body)
                    ));
                    queue.in_flight.insert(receipt, (id, body));
                }
                ok(format!(
                    "<ReceiveMessageResponse><ReceiveMessageResult>{}\
                     </ReceiveMessageResult></ReceiveMessageResponse>",
                    messages
                ))
            }
            "DeleteMessage" => match queue.in_flight.remove(&params["ReceiptHandle"]) {
                Some(_) => ok("<DeleteMessageResponse/>".to_string()),
                None => error("ReceiptHandleIsInvalid", "unknown receipt"),
            },
            "PurgeQueue" => {
                queue.visible.clear();
                queue.in_flight.clear();
                ok("<PurgeQueueResponse/>".to_string())
            }
            "GetQueueAttributes" => ok(format!(
                "<GetQueueAttributesResponse><GetQueueAttributesResult>\
                 <Attribute><Name>ApproximateNumberOfMessages</Name><Value>{}</Value></Attribute>\
                 <Attribute><Name>ApproximateNumberOfMessagesNotVisible</Name><Value>{}</Value></Attribute>\
                 </GetQueueAttributesResult></GetQueueAttributesResponse>",
                queue.visible.len(),
                queue.in_flight.len()
            )),
            _ => error("InvalidAction", "unsupported action"),
        }
    }
}

fn query(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

fn base_url(request: &Request) -> String {
    let url = &request.url;
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), url.host_str().unwrap_or_default(), port),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn ok(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

fn error(code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_string(format!(
        "<ErrorResponse><Error><Type>Sender</Type><Code>{}</Code><Message>{}</Message></Error>\
         </ErrorResponse>",
        code, message
    ))
}
