//! AWS SQS backend implementation using the HTTP Query API.
//!
//! This module talks to SQS with direct HTTP calls instead of the AWS SDK,
//! which keeps the dependency footprint small and lets unit tests mock the
//! service with canned XML responses.
//!
//! ## Key Features
//!
//! - **Query API**: `Action=...&Version=2012-11-05` requests, XML responses
//! - **AWS Signature V4**: Manual request signing for authentication
//! - **Batch sends**: Up to 10 entries per `SendMessageBatch`, with per-entry
//!   failures reported back to the caller
//! - **Endpoint override**: Point the backend at LocalStack, ElasticMQ or a
//!   mock server through [`QueueConfig::endpoint_url`]
//!
//! ## Error Mapping
//!
//! | Service condition                          | `QueueError`           |
//! |--------------------------------------------|------------------------|
//! | Transport failure, timeout                 | `BackendUnavailable`   |
//! | `NonExistentQueue` / `QueueDoesNotExist`   | `QueueNotFound`        |
//! | Bad credentials or signature, 401/403      | `AuthenticationFailed` |
//! | `ReceiptHandleIsInvalid`                   | `InvalidReceipt`       |
//! | Anything else                              | `ProviderError`        |

use crate::backend::{BatchEntry, BatchEntryResult, QueueBackend};
use crate::config::QueueConfig;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{
    ApproximateCounts, MessageId, QueueEndpoint, QueueName, RawMessage, ReceiptHandle,
    SentMessage, MAX_WAIT_SECONDS,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";

/// Transport timeout; must exceed the 20 second long-poll ceiling
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("SQS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl AwsError {
    /// Map AWS error to QueueError
    pub fn into_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::BackendUnavailable { message },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: "AwsSqs".to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::InvalidReceipt(receipt) => QueueError::InvalidReceipt { receipt },
            Self::ConfigurationError(message) => {
                QueueError::Configuration(ConfigurationError::Invalid { message })
            }
            Self::MalformedResponse(message) => {
                QueueError::Serialization(SerializationError::MalformedResponse { message })
            }
        }
    }
}

impl From<AwsError> for QueueError {
    fn from(error: AwsError) -> Self {
        error.into_queue_error()
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
///
/// ## References
///
/// - [AWS Signature V4](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a request and return the headers to add to it
    /// (`Authorization`, `x-amz-date`, `host`)
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &BTreeMap<String, String>,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, AwsError> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical request; query parameters sorted by encoded key
        let canonical_query_string = encode_query(query_params);
        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query_string, canonical_headers, signed_headers, payload_hash
        );

        // String to sign
        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp)?;

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        Ok(vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
            ("host".to_string(), host.to_string()),
        ])
    }

    /// Derive the signing key and sign:
    /// kDate = HMAC("AWS4" + secret, date), kRegion, kService, kSigning,
    /// then signature = HMAC(kSigning, string_to_sign)
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> Result<String, AwsError> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;

        Ok(hex::encode(signature))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AwsError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AwsError::ConfigurationError(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn encode_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// AWS SQS Backend
// ============================================================================

/// AWS SQS backend
///
/// Stateless apart from the HTTP connection pool; endpoint caching is done
/// by the [`Queue`](crate::Queue) readiness gate. Safe to share across tasks.
pub struct AwsSqsBackend {
    http_client: HttpClient,
    signer: AwsV4Signer,
    service_url: String,
    host: String,
    config: QueueConfig,
}

impl AwsSqsBackend {
    /// Create new AWS SQS backend from a validated configuration
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;

        let service_url = config.service_url();
        let parsed = url::Url::parse(&service_url).map_err(|e| {
            AwsError::ConfigurationError(format!("Invalid service URL '{}': {}", service_url, e))
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(AwsError::ConfigurationError(format!(
                    "Service URL '{}' has no host",
                    service_url
                ))
                .into())
            }
        };

        let signer = AwsV4Signer::new(
            config.access_key_id.clone().unwrap_or_default(),
            config.secret_access_key.clone().unwrap_or_default(),
            config.region.clone(),
        );

        let http_client = HttpClient::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            service_url,
            host,
            config,
        })
    }

    /// Make a signed Query API call and return the response body
    #[instrument(skip(self, params))]
    async fn call(
        &self,
        action: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<String, AwsError> {
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());

        let timestamp = Utc::now();
        let path = "/";
        let auth_headers =
            self.signer
                .sign_request("POST", &self.host, path, &params, "", &timestamp)?;

        let url = format!("{}{}?{}", self.service_url, path, encode_query(&params));
        let mut request = self.http_client.post(&url);
        for (key, value) in auth_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::NetworkError(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        debug!(status = status.as_u16(), "SQS responded");

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }

    fn queue_params(endpoint: &QueueEndpoint) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("QueueUrl".to_string(), endpoint.as_str().to_string());
        params
    }
}

impl fmt::Debug for AwsSqsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsBackend")
            .field("service_url", &self.service_url)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueBackend for AwsSqsBackend {
    async fn resolve_endpoint(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        let mut params = BTreeMap::new();
        params.insert("QueueName".to_string(), queue.as_str().to_string());

        let response = self.call("GetQueueUrl", params).await?;
        let url = single_field(&response, "GetQueueUrlResult", "QueueUrl")?;
        Ok(QueueEndpoint::new(url))
    }

    async fn send_message(
        &self,
        endpoint: &QueueEndpoint,
        body: &str,
        delay_seconds: Option<u32>,
    ) -> Result<SentMessage, QueueError> {
        let mut params = Self::queue_params(endpoint);
        params.insert("MessageBody".to_string(), body.to_string());
        if let Some(delay) = delay_seconds {
            params.insert("DelaySeconds".to_string(), delay.to_string());
        }

        let response = self.call("SendMessage", params).await?;
        let record = parse_records(&response, "SendMessageResult", &["MessageId", "MD5OfMessageBody"])?
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::MalformedResponse("SendMessageResult not found".to_string()))?;

        Ok(SentMessage {
            id: MessageId::new(required(&record, "MessageId")?),
            digest: record.get("MD5OfMessageBody").cloned().unwrap_or_default(),
        })
    }

    async fn send_message_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>, QueueError> {
        let mut params = Self::queue_params(endpoint);
        for (idx, entry) in entries.iter().enumerate() {
            let prefix = format!("SendMessageBatchRequestEntry.{}", idx + 1);
            params.insert(format!("{}.Id", prefix), entry.client_token.clone());
            params.insert(format!("{}.MessageBody", prefix), entry.body.clone());
            if let Some(delay) = entry.delay_seconds {
                params.insert(format!("{}.DelaySeconds", prefix), delay.to_string());
            }
        }

        let response = self.call("SendMessageBatch", params).await?;

        let succeeded = parse_records(
            &response,
            "SendMessageBatchResultEntry",
            &["Id", "MessageId", "MD5OfMessageBody"],
        )?;
        let failed = parse_records(
            &response,
            "BatchResultErrorEntry",
            &["Id", "Code", "Message", "SenderFault"],
        )?;

        let mut results = Vec::with_capacity(succeeded.len() + failed.len());
        for record in succeeded {
            results.push(BatchEntryResult {
                client_token: required(&record, "Id")?,
                outcome: Ok(SentMessage {
                    id: MessageId::new(required(&record, "MessageId")?),
                    digest: record.get("MD5OfMessageBody").cloned().unwrap_or_default(),
                }),
            });
        }
        for record in failed {
            let code = record.get("Code").cloned().unwrap_or_else(|| "Unknown".to_string());
            let message = record.get("Message").cloned().unwrap_or_default();
            results.push(BatchEntryResult {
                client_token: required(&record, "Id")?,
                outcome: Err(AwsError::ServiceError { code, message }.into()),
            });
        }

        Ok(results)
    }

    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_count: u32,
        wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, QueueError> {
        let mut params = Self::queue_params(endpoint);
        params.insert(
            "MaxNumberOfMessages".to_string(),
            max_count.clamp(1, 10).to_string(),
        );
        params.insert(
            "WaitTimeSeconds".to_string(),
            wait_seconds.min(MAX_WAIT_SECONDS).to_string(),
        );

        let response = self.call("ReceiveMessage", params).await?;
        let records = parse_records(
            &response,
            "Message",
            &["MessageId", "ReceiptHandle", "MD5OfBody", "Body"],
        )?;

        records
            .into_iter()
            .map(|record| {
                let receipt = ReceiptHandle::new(required(&record, "ReceiptHandle")?)
                    .map_err(|e| AwsError::MalformedResponse(e.to_string()))?;
                Ok(RawMessage {
                    id: MessageId::new(required(&record, "MessageId")?),
                    body: required(&record, "Body")?,
                    digest: record.get("MD5OfBody").cloned().unwrap_or_default(),
                    receipt,
                })
            })
            .collect::<Result<Vec<_>, AwsError>>()
            .map_err(QueueError::from)
    }

    async fn delete_message(
        &self,
        endpoint: &QueueEndpoint,
        receipt: &str,
    ) -> Result<(), QueueError> {
        let mut params = Self::queue_params(endpoint);
        params.insert("ReceiptHandle".to_string(), receipt.to_string());

        // DeleteMessage returns an empty result on success
        self.call("DeleteMessage", params).await?;
        Ok(())
    }

    async fn purge_queue(&self, endpoint: &QueueEndpoint) -> Result<(), QueueError> {
        self.call("PurgeQueue", Self::queue_params(endpoint)).await?;
        Ok(())
    }

    async fn approximate_counts(
        &self,
        endpoint: &QueueEndpoint,
    ) -> Result<ApproximateCounts, QueueError> {
        let mut params = Self::queue_params(endpoint);
        params.insert(
            "AttributeName.1".to_string(),
            "ApproximateNumberOfMessages".to_string(),
        );
        params.insert(
            "AttributeName.2".to_string(),
            "ApproximateNumberOfMessagesNotVisible".to_string(),
        );

        let response = self.call("GetQueueAttributes", params).await?;
        let attributes: HashMap<String, String> =
            parse_records(&response, "Attribute", &["Name", "Value"])?
                .into_iter()
                .filter_map(|mut record| Some((record.remove("Name")?, record.remove("Value")?)))
                .collect();

        Ok(ApproximateCounts {
            visible: count_attribute(&attributes, "ApproximateNumberOfMessages")?,
            in_flight: count_attribute(&attributes, "ApproximateNumberOfMessagesNotVisible")?,
        })
    }

    fn name(&self) -> &'static str {
        "AwsSqs"
    }
}

// ============================================================================
// XML Parsing
// ============================================================================

/// Collect the text of `fields` inside every `record` element of `xml`
fn parse_records(
    xml: &str,
    record: &str,
    fields: &[&str],
) -> Result<Vec<HashMap<String, String>>, AwsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    let mut field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == record {
                    current = Some(HashMap::new());
                } else if current.is_some() && fields.contains(&name.as_str()) {
                    field = Some(name);
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(values), Some(name)) = (current.as_mut(), field.take()) {
                    let text = e
                        .unescape()
                        .map_err(|e| AwsError::MalformedResponse(format!("Failed to parse XML: {}", e)))?;
                    values.insert(name, text.into_owned());
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == record.as_bytes() {
                    if let Some(values) = current.take() {
                        records.push(values);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AwsError::MalformedResponse(format!(
                    "XML parsing error: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn single_field(xml: &str, record: &str, field: &str) -> Result<String, AwsError> {
    parse_records(xml, record, &[field])?
        .into_iter()
        .find_map(|mut values| values.remove(field))
        .ok_or_else(|| AwsError::MalformedResponse(format!("{} not found in response", field)))
}

fn required(record: &HashMap<String, String>, field: &str) -> Result<String, AwsError> {
    record
        .get(field)
        .cloned()
        .ok_or_else(|| AwsError::MalformedResponse(format!("{} missing from response", field)))
}

fn count_attribute(attributes: &HashMap<String, String>, name: &str) -> Result<u64, AwsError> {
    attributes
        .get(name)
        .ok_or_else(|| AwsError::MalformedResponse(format!("{} missing from response", name)))?
        .parse()
        .map_err(|e| AwsError::MalformedResponse(format!("{} is not a count: {}", name, e)))
}

/// Map an error response to the matching error kind
fn parse_error_response(xml: &str, status_code: u16) -> AwsError {
    let record = parse_records(xml, "Error", &["Code", "Message"])
        .ok()
        .and_then(|records| records.into_iter().next())
        .unwrap_or_default();

    let code = record
        .get("Code")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let message = record
        .get("Message")
        .cloned()
        .unwrap_or_else(|| format!("HTTP status {}", status_code));

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            AwsError::QueueNotFound(message)
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch"
        | "MissingAuthenticationToken" => AwsError::Authentication(format!("{}: {}", code, message)),
        "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" => AwsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            AwsError::Authentication(format!("{}: {}", code, message))
        }
        _ => AwsError::ServiceError { code, message },
    }
}
