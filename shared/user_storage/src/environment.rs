//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use aws_sdk_dynamodb::Client as DynamoDbClient;

const DEFAULT_TABLE_NAME: &str = "users";
const DEFAULT_LAST_NAME_INDEX: &str = "lastNameIndex";
const DEFAULT_BATCH_GET_CONCURRENCY: usize = 4;

/// Read-only configuration of a [`UserStorage`](crate::UserStorage) handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Users table name
    pub table_name: String,
    /// Name of the GSI keyed on `lastName`
    pub last_name_index_name: String,
    /// Upper bound on batch get chunks in flight at once
    pub batch_get_concurrency: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            last_name_index_name: DEFAULT_LAST_NAME_INDEX.to_string(),
            batch_get_concurrency: DEFAULT_BATCH_GET_CONCURRENCY,
        }
    }
}

/// Application environment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development,
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Returns the users table name for the environment
    ///
    /// # Panics
    ///
    /// Panics if the `USERS_TABLE_NAME` environment variable is not set
    /// outside development
    #[must_use]
    pub fn users_table_name(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("USERS_TABLE_NAME")
                .expect("USERS_TABLE_NAME environment variable is not set"),
            Self::Development => {
                env::var("USERS_TABLE_NAME").unwrap_or_else(|_| DEFAULT_TABLE_NAME.to_string())
            }
        }
    }

    /// Name of the GSI keyed on `lastName`
    #[must_use]
    pub fn last_name_index_name(&self) -> String {
        env::var("USERS_LAST_NAME_INDEX").unwrap_or_else(|_| DEFAULT_LAST_NAME_INDEX.to_string())
    }

    /// Upper bound on batch get chunks in flight at once
    #[must_use]
    pub fn batch_get_concurrency(&self) -> usize {
        env::var("BATCH_GET_CONCURRENCY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_GET_CONCURRENCY)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub fn override_aws_endpoint_url(&self) -> Option<String> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development => Some(
                env::var("DYNAMODB_ENDPOINT_URL")
                    .unwrap_or_else(|_| "http://localhost:4566".to_string()),
            ),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// `DynamoDB` client built from [`Self::aws_config`]
    pub async fn dynamodb_client(&self) -> DynamoDbClient {
        DynamoDbClient::new(&self.aws_config().await)
    }

    /// Storage settings for the environment
    #[must_use]
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            table_name: self.users_table_name(),
            last_name_index_name: self.last_name_index_name(),
            batch_get_concurrency: self.batch_get_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_environment_from_env() {
        // Test development (default)
        env::remove_var("APP_ENV");
        assert_eq!(Environment::from_env(), Environment::Development);

        env::set_var("APP_ENV", " Staging ");
        assert_eq!(Environment::from_env(), Environment::Staging);

        env::set_var("APP_ENV", "production");
        assert_eq!(Environment::from_env(), Environment::Production);

        env::remove_var("APP_ENV");
    }

    #[test]
    #[serial]
    #[should_panic(expected = "Invalid environment: invalid")]
    fn test_invalid_environment() {
        env::set_var("APP_ENV", "invalid");
        let _ = Environment::from_env();
    }

    #[test]
    #[serial]
    fn test_development_storage_settings_defaults() {
        env::remove_var("USERS_TABLE_NAME");
        env::remove_var("USERS_LAST_NAME_INDEX");
        env::remove_var("BATCH_GET_CONCURRENCY");

        assert_eq!(
            Environment::Development.storage_settings(),
            StorageSettings::default()
        );
    }

    #[test]
    #[serial]
    fn test_storage_settings_from_variables() {
        env::set_var("USERS_TABLE_NAME", "users-staging");
        env::set_var("USERS_LAST_NAME_INDEX", "byLastName");
        env::set_var("BATCH_GET_CONCURRENCY", "0");

        let settings = Environment::Staging.storage_settings();

        assert_eq!(settings.table_name, "users-staging");
        assert_eq!(settings.last_name_index_name, "byLastName");
        assert_eq!(settings.batch_get_concurrency, DEFAULT_BATCH_GET_CONCURRENCY);

        env::remove_var("USERS_TABLE_NAME");
        env::remove_var("USERS_LAST_NAME_INDEX");
        env::remove_var("BATCH_GET_CONCURRENCY");
    }

    #[test]
    #[serial]
    fn test_endpoint_override() {
        env::remove_var("DYNAMODB_ENDPOINT_URL");
        assert_eq!(Environment::Production.override_aws_endpoint_url(), None);
        assert_eq!(
            Environment::Development
                .override_aws_endpoint_url()
                .as_deref(),
            Some("http://localhost:4566")
        );

        env::set_var("DYNAMODB_ENDPOINT_URL", "http://localhost:8000");
        assert_eq!(
            Environment::Development
                .override_aws_endpoint_url()
                .as_deref(),
            Some("http://localhost:8000")
        );
        env::remove_var("DYNAMODB_ENDPOINT_URL");
    }
}
