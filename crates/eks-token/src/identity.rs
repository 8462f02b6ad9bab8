//! Caller identity sources
//!
//! The token minter never reads credentials from the environment itself.
//! It asks an [`IdentityProvider`] for the credentials and region to sign with.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use thiserror::Error;

/// Errors that can occur while obtaining the caller identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("No credentials provider configured")]
    NoCredentialsProvider,

    #[error("No AWS region configured")]
    MissingRegion,

    #[error("Failed to load credentials: {0}")]
    Credentials(String),
}

/// Credentials plus the region their signature is scoped to
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub credentials: Credentials,
    pub region: String,
}

/// Source of the identity a token is signed with
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError>;
}

/// Identity resolved through the AWS default credential chain
///
/// Environment variables, shared profiles, web identity and container/instance
/// metadata are all handled by `aws-config`; credentials are fetched on every
/// call so rotated session credentials are picked up.
#[derive(Debug, Clone)]
pub struct AmbientIdentity {
    provider: SharedCredentialsProvider,
    region: String,
}

impl AmbientIdentity {
    /// Build from a loaded SDK config
    pub fn from_sdk_config(config: &SdkConfig) -> Result<Self, IdentityError> {
        let provider = config
            .credentials_provider()
            .ok_or(IdentityError::NoCredentialsProvider)?;
        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or(IdentityError::MissingRegion)?;

        Ok(Self { provider, region })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl IdentityProvider for AmbientIdentity {
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        let credentials = self
            .provider
            .provide_credentials()
            .await
            .map_err(|e| IdentityError::Credentials(e.to_string()))?;

        Ok(CallerIdentity {
            credentials,
            region: self.region.clone(),
        })
    }
}

/// Fixed credentials, useful when the caller already holds them
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    identity: CallerIdentity,
}

impl StaticIdentity {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        region: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            "static",
        );
        Self {
            identity: CallerIdentity {
                credentials,
                region: region.into(),
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        Ok(self.identity.clone())
    }
}
