//! Per-invocation orchestration
//!
//! resolve cluster → mint token → build session → list pods → format.
//! The handler is long-lived; only the resolver's cache outlives a request.

use std::future::Future;
use std::time::Duration;

use eks_token::{IdentityProvider, MintError, TokenMinter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{ClusterDescriber, ClusterResolver, ResolutionError};
use crate::kubernetes::{ClientConfigError, KubeClientError, PodCounter};

/// Message returned to the caller for any failure
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Invocation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEvent {
    #[serde(rename = "ClusterName", alias = "clusterName", alias = "cluster_name")]
    pub cluster_name: String,
}

impl FunctionEvent {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }
}

/// Invocation result: a message plus the error, if any
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationResponse {
    /// Cluster the event named; absent when the event could not be parsed
    #[serde(rename = "ClusterName", default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Cluster resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Token minting failed: {0}")]
    Mint(#[from] MintError),

    #[error("Client configuration failed: {0}")]
    Config(#[from] ClientConfigError),

    #[error("Pod query failed: {0}")]
    Query(kube::Error),

    #[error("{step} timed out after {timeout:?}")]
    Timeout { step: &'static str, timeout: Duration },
}

impl From<KubeClientError> for HandlerError {
    fn from(e: KubeClientError) -> Self {
        match e {
            KubeClientError::Config(e) => HandlerError::Config(e),
            KubeClientError::Query(e) => HandlerError::Query(e),
        }
    }
}

/// Counts pods in a named cluster
pub struct RequestHandler<D, I, Q> {
    resolver: ClusterResolver<D>,
    minter: TokenMinter<I>,
    pods: Q,
    call_timeout: Duration,
}

impl<D, I, Q> RequestHandler<D, I, Q>
where
    D: ClusterDescriber,
    I: IdentityProvider,
    Q: PodCounter,
{
    pub fn new(
        resolver: ClusterResolver<D>,
        minter: TokenMinter<I>,
        pods: Q,
        call_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            minter,
            pods,
            call_timeout,
        }
    }

    pub fn resolver(&self) -> &ClusterResolver<D> {
        &self.resolver
    }

    /// Run one invocation
    pub async fn handle(&self, event: &FunctionEvent) -> Result<String, HandlerError> {
        let cluster_name = event.cluster_name.as_str();

        tracing::info!("Getting cluster {}", cluster_name);
        let info = self
            .within("cluster resolution", self.resolver.resolve(cluster_name))
            .await?;

        tracing::info!("Getting token");
        let token = self
            .within("token minting", self.minter.mint(cluster_name))
            .await?;

        let count = self
            .within("pod query", self.pods.count_pods(&info, token))
            .await?;

        Ok(format!("There are {} pods in the cluster", count))
    }

    /// Run one invocation, pairing failures with the generic message
    pub async fn respond(&self, event: &FunctionEvent) -> InvocationResponse {
        match self.handle(event).await {
            Ok(message) => InvocationResponse {
                cluster_name: Some(event.cluster_name.clone()),
                message,
                error: None,
            },
            Err(e) => {
                tracing::error!("Invocation for {} failed: {}", event.cluster_name, e);
                InvocationResponse {
                    cluster_name: Some(event.cluster_name.clone()),
                    message: GENERIC_ERROR_MESSAGE.to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Bound a step by the call timeout
    async fn within<T, E, F>(&self, step: &'static str, fut: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<HandlerError>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(HandlerError::Timeout {
                step,
                timeout: self.call_timeout,
            }),
        }
    }
}
