use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_types::sdk_config::{RetryConfig, SdkConfig, TimeoutConfig};
use std::time::Duration;
use tracing::debug;

/// Endpoint used when `AWS_PROFILE=localstack` and no explicit endpoint is given
pub const LOCALSTACK_ENDPOINT: &str = "http://127.0.0.1:4566";

/// Where and how to connect to the table service
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    /// Alternate endpoint, e.g. DynamoDB Local or LocalStack
    pub endpoint_url: Option<String>,
    /// Region override; falls back to the default provider chain
    pub region: Option<String>,
    /// Named credentials profile
    pub profile: Option<String>,
}

impl ClientOptions {
    /// Endpoint to use, honoring `AWS_PROFILE=localstack` when none was given
    pub fn resolved_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = &self.endpoint_url {
            return Some(endpoint.clone());
        }
        let profile = self
            .profile
            .clone()
            .or_else(|| std::env::var("AWS_PROFILE").ok())
            .unwrap_or_default();
        (profile == "localstack").then(|| LOCALSTACK_ENDPOINT.to_string())
    }
}

/// Load the shared SDK configuration
///
/// It configures:
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
pub async fn sdk_config(options: &ClientOptions) -> SdkConfig {
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    if let Some(region) = &options.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }

    if let Some(endpoint) = options.resolved_endpoint() {
        debug!(endpoint = %endpoint, "using custom DynamoDB endpoint");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Build a DynamoDB client for `options`
///
/// Each call builds a fresh client, so a single process can talk to several endpoints,
/// e.g. when migrating between accounts or from a local store.
pub async fn connect(options: &ClientOptions) -> Client {
    let config = sdk_config(options).await;
    Client::new(&config)
}
