use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::SdkError;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;

/// Read access to the store holding the mailer api key. Implementations
/// resolve a secret name to its string-to-string payload.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(
        &self,
        name: &str,
    ) -> Result<HashMap<String, String>, SecretAccessError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SecretAccessError {
    #[error("the secret store rejected the request for '{name}'")]
    Retrieval {
        name: String,
        #[source]
        source: SdkError<GetSecretValueError>,
    },
    #[error("secret '{name}' carries no string payload")]
    MissingPayload { name: String },
    #[error("secret '{name}' is not a JSON object of string values")]
    MalformedPayload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("secret '{name}' has no '{key}' entry")]
    MissingKey { name: String, key: String },
}

/// AWS Secrets Manager-backed store. Secrets are fetched on every call, no
/// caching.
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    /// Build a store from the ambient AWS environment (region, credentials).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_secretsmanager::Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    #[tracing::instrument(name = "Fetching secret from AWS Secrets Manager", skip(self))]
    async fn get_secret(
        &self,
        name: &str,
    ) -> Result<HashMap<String, String>, SecretAccessError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|source| SecretAccessError::Retrieval {
                name: name.to_owned(),
                source,
            })?;

        let payload = response
            .secret_string()
            .ok_or_else(|| SecretAccessError::MissingPayload {
                name: name.to_owned(),
            })?;

        serde_json::from_str(payload).map_err(|source| SecretAccessError::MalformedPayload {
            name: name.to_owned(),
            source,
        })
    }
}
