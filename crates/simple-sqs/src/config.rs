//! Client configuration.
//!
//! Configuration can be built in code or loaded with [`QueueConfig::load`],
//! which layers these sources (later sources override earlier ones):
//!
//! 1. An optional file (YAML, TOML or JSON, picked by extension)
//! 2. Environment variables prefixed `SIMPLE_SQS__`, e.g.
//!    `SIMPLE_SQS__QUEUE_NAME=orders` or `SIMPLE_SQS__REGION=eu-west-1`

use crate::error::ConfigurationError;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable prefix read by [`QueueConfig::load`]
pub const ENV_PREFIX: &str = "SIMPLE_SQS";

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Configuration for binding a client to one remote queue
#[derive(Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Overrides the regional service URL (LocalStack, ElasticMQ, tests)
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl QueueConfig {
    /// Create configuration for a queue with the default region and no credentials
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Load configuration from an optional file and `SIMPLE_SQS__*` variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigurationError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }

        let loaded = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let config: QueueConfig =
            loaded
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Validated queue name
    pub fn queue_name(&self) -> Result<QueueName, ConfigurationError> {
        QueueName::new(self.queue_name.clone()).map_err(|e| ConfigurationError::Invalid {
            message: e.to_string(),
        })
    }

    /// Check that the configuration can be used to build a client
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_name.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_name".to_string(),
            });
        }
        self.queue_name()?;

        if self.region.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "region cannot be empty".to_string(),
            });
        }

        if self.access_key_id.as_deref().unwrap_or_default().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "access_key_id".to_string(),
            });
        }

        if self.secret_access_key.as_deref().unwrap_or_default().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "secret_access_key".to_string(),
            });
        }

        if let Some(ref endpoint_url) = self.endpoint_url {
            url::Url::parse(endpoint_url).map_err(|e| ConfigurationError::Invalid {
                message: format!("endpoint_url '{}' is not a valid URL: {}", endpoint_url, e),
            })?;
        }

        Ok(())
    }

    /// Service URL requests are sent to
    pub fn service_url(&self) -> String {
        match self.endpoint_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://sqs.{}.amazonaws.com", self.region),
        }
    }
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("queue_name", &self.queue_name)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
