//! Tests for client configuration.

use super::*;
use std::io::Write;

fn valid_config() -> QueueConfig {
    QueueConfig::new("orders").with_credentials("AKIDEXAMPLE", "secret")
}

mod validation {
    use super::*;

    use tokio_test::assert_ok;

    #[test]
    fn test_valid_configuration() {
        let config = valid_config();
        assert_ok!(config.validate());
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_missing_queue_name() {
        let config = QueueConfig::new("").with_credentials("a", "b");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Missing { key }) if key == "queue_name"
        ));
    }

    #[test]
    fn test_invalid_queue_name() {
        let config = QueueConfig::new("not a name").with_credentials("a", "b");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let config = QueueConfig::new("orders");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Missing { key }) if key == "access_key_id"
        ));

        let config = QueueConfig::new("orders").with_credentials("a", "");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Missing { key }) if key == "secret_access_key"
        ));
    }

    #[test]
    fn test_empty_region() {
        let config = valid_config().with_region("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_url() {
        let config = valid_config().with_endpoint_url("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid { .. })
        ));
    }
}

mod service_url {
    use super::*;

    #[test]
    fn test_regional_url() {
        let config = valid_config().with_region("eu-west-1");
        assert_eq!(config.service_url(), "https://sqs.eu-west-1.amazonaws.com");
    }

    #[test]
    fn test_endpoint_override_trims_trailing_slash() {
        let config = valid_config().with_endpoint_url("http://localhost:4566/");
        assert_eq!(config.service_url(), "http://localhost:4566");
    }
}

mod loading {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let output = format!("{:?}", valid_config());
        assert!(output.contains("<redacted>"));
        assert!(!output.contains("\"secret\""));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = QueueConfig::load(Some("/nonexistent/simple-sqs-config.yaml"));
        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    // File and environment layering share process state, so both live in one test
    #[test]
    fn test_load_from_file_then_environment_override() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "queue_name: orders\naccess_key_id: AKIDEXAMPLE\nsecret_access_key: secret\nendpoint_url: http://localhost:9324"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = QueueConfig::load(Some(&path)).unwrap();
        assert_eq!(config.queue_name, "orders");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.service_url(), "http://localhost:9324");

        std::env::set_var("SIMPLE_SQS__REGION", "ap-southeast-2");
        let overridden = QueueConfig::load(Some(&path));
        std::env::remove_var("SIMPLE_SQS__REGION");

        assert_eq!(overridden.unwrap().region, "ap-southeast-2");
    }
}
