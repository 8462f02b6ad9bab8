//! Per-request client sessions
//!
//! Builds a single-cluster kubeconfig in memory from resolved connection info
//! and a freshly minted token, then turns it into a kube client. Nothing here
//! is cached or written to disk.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eks_token::BearerToken;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::cluster::ClusterConnectionInfo;

const CLUSTER_ENTRY: &str = "cluster";
const CONTEXT_ENTRY: &str = "context";
const USER_ENTRY: &str = "user";
const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("Invalid API endpoint {0}: {1}")]
    InvalidEndpoint(String, String),

    #[error("Certificate authority data is not a PEM certificate")]
    InvalidCertificate,

    #[error("Failed to assemble kubeconfig: {0}")]
    Kubeconfig(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    Config(#[from] kube::config::KubeconfigError),

    #[error("Failed to create client: {0}")]
    Client(#[from] kube::Error),
}

/// Throwaway client configuration for one request
#[derive(Debug, Clone)]
pub struct EphemeralClientConfig {
    pub server: String,
    pub certificate_authority: Vec<u8>,
    pub token: BearerToken,
}

impl EphemeralClientConfig {
    /// Validate connection info and pair it with a token
    pub fn new(info: &ClusterConnectionInfo, token: BearerToken) -> Result<Self, ClientConfigError> {
        let endpoint = Url::parse(&info.endpoint)
            .map_err(|e| ClientConfigError::InvalidEndpoint(info.endpoint.clone(), e.to_string()))?;
        if !matches!(endpoint.scheme(), "https" | "http") || endpoint.host_str().is_none() {
            return Err(ClientConfigError::InvalidEndpoint(
                info.endpoint.clone(),
                "expected an http(s) URL with a host".to_string(),
            ));
        }

        let pem = String::from_utf8_lossy(&info.certificate_authority);
        if !pem.contains(PEM_CERTIFICATE_HEADER) {
            return Err(ClientConfigError::InvalidCertificate);
        }

        Ok(Self {
            server: info.endpoint.clone(),
            certificate_authority: info.certificate_authority.clone(),
            token,
        })
    }

    /// Render as a kubeconfig with one cluster, one user and one current context
    pub fn to_kubeconfig(&self) -> Result<Kubeconfig, ClientConfigError> {
        Ok(serde_json::from_value(self.kubeconfig_document())?)
    }

    fn kubeconfig_document(&self) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{
                "name": CLUSTER_ENTRY,
                "cluster": {
                    "server": self.server,
                    "certificate-authority-data": STANDARD.encode(&self.certificate_authority),
                },
            }],
            "contexts": [{
                "name": CONTEXT_ENTRY,
                "context": {
                    "cluster": CLUSTER_ENTRY,
                    "user": USER_ENTRY,
                },
            }],
            "users": [{
                "name": USER_ENTRY,
                "user": {
                    "token": self.token.as_str(),
                },
            }],
            "current-context": CONTEXT_ENTRY,
        })
    }
}

/// Builds kube clients from ephemeral configurations
#[derive(Debug, Clone)]
pub struct ClientSessionBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for ClientSessionBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientSessionBuilder {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Build a client bound to `info`'s API server, authenticated by `token`
    pub async fn build(
        &self,
        info: &ClusterConnectionInfo,
        token: BearerToken,
    ) -> Result<Client, ClientConfigError> {
        let config = self.config(info, token).await?;
        Ok(Client::try_from(config)?)
    }

    async fn config(
        &self,
        info: &ClusterConnectionInfo,
        token: BearerToken,
    ) -> Result<Config, ClientConfigError> {
        let session = EphemeralClientConfig::new(info, token)?;
        let kubeconfig = session.to_kubeconfig()?;

        let options = KubeConfigOptions {
            context: Some(CONTEXT_ENTRY.to_string()),
            ..Default::default()
        };
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        Ok(config)
    }
}
