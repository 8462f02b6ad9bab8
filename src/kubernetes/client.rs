//! Kubernetes API client
//!
//! Wraps the kube crate for the single read the handler performs: listing
//! pods across all namespaces.

use async_trait::async_trait;
use eks_token::BearerToken;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams},
    Client,
};
use thiserror::Error;

use super::session::{ClientConfigError, ClientSessionBuilder};
use crate::cluster::ClusterConnectionInfo;

#[derive(Debug, Error)]
pub enum KubeClientError {
    #[error("Client configuration failed: {0}")]
    Config(#[from] ClientConfigError),
    #[error("Pod query failed: {0}")]
    Query(#[from] kube::Error),
}

/// Kubernetes API client bound to one cluster session
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Count pods across all namespaces
    pub async fn count_pods(&self) -> Result<usize, kube::Error> {
        let start = std::time::Instant::now();
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;
        tracing::debug!("list_pods(all) API call took {:?}", start.elapsed());

        Ok(list.items.len())
    }
}

/// The read-only query the handler runs against a cluster
#[async_trait]
pub trait PodCounter: Send + Sync {
    async fn count_pods(
        &self,
        info: &ClusterConnectionInfo,
        token: BearerToken,
    ) -> Result<usize, KubeClientError>;
}

/// Counts pods by talking to the cluster's API server
#[derive(Debug, Clone, Default)]
pub struct ApiServerPodCounter {
    builder: ClientSessionBuilder,
}

impl ApiServerPodCounter {
    pub fn new(builder: ClientSessionBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl PodCounter for ApiServerPodCounter {
    async fn count_pods(
        &self,
        info: &ClusterConnectionInfo,
        token: BearerToken,
    ) -> Result<usize, KubeClientError> {
        let client = KubeClient::new(self.builder.build(info, token).await?);
        Ok(client.count_pods().await?)
    }
}
