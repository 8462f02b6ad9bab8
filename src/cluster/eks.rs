//! EKS control plane access

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_eks::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_eks::Client as EksClient;

use super::resolver::ResolutionError;

/// Raw connection details as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    pub endpoint: Option<String>,
    /// Base64-encoded PEM bundle
    pub certificate_authority_data: Option<String>,
    pub status: Option<String>,
}

/// The "describe cluster" operation of a cluster-management control plane
#[async_trait]
pub trait ClusterDescriber: Send + Sync {
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ResolutionError>;
}

/// `DescribeCluster` against the EKS API
#[derive(Debug, Clone)]
pub struct EksControlPlane {
    client: EksClient,
}

impl EksControlPlane {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: EksClient::new(config),
        }
    }
}

#[async_trait]
impl ClusterDescriber for EksControlPlane {
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ResolutionError> {
        let start = std::time::Instant::now();
        let output = self
            .client
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_resource_not_found_exception() {
                    ResolutionError::NotFound(name.to_string())
                } else if matches!(
                    err.code(),
                    Some("AccessDeniedException") | Some("UnauthorizedOperation")
                ) {
                    ResolutionError::AccessDenied(DisplayErrorContext(&err).to_string())
                } else {
                    ResolutionError::ControlPlane(DisplayErrorContext(&err).to_string())
                }
            })?;
        tracing::debug!("DescribeCluster({}) took {:?}", name, start.elapsed());

        let cluster = output
            .cluster()
            .ok_or_else(|| ResolutionError::NotFound(name.to_string()))?;

        Ok(ClusterDescription {
            endpoint: cluster.endpoint().map(String::from),
            certificate_authority_data: cluster
                .certificate_authority()
                .and_then(|ca| ca.data())
                .map(String::from),
            status: cluster.status().map(|s| s.as_str().to_string()),
        })
    }
}
