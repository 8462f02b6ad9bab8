//! Cluster resolution with a process-wide cache
//!
//! Each cluster name maps to a slot holding a `OnceCell`. Callers that race
//! on an unseen name all wait on the same cell, so the control plane sees at
//! most one in-flight `DescribeCluster` per name. A failed resolution removes
//! its empty slot; nothing is cached for failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::eks::{ClusterDescriber, ClusterDescription};

/// EKS returns padded base64, but unpadded data is accepted too
const CA_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Cluster name must not be empty")]
    EmptyClusterName,

    #[error("Cluster not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Cluster {cluster} has no {field}")]
    MissingField {
        cluster: String,
        field: &'static str,
    },

    #[error("Invalid certificate authority data for {cluster}: {source}")]
    InvalidCertificate {
        cluster: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Endpoint and CA bundle needed to talk to a cluster's API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnectionInfo {
    pub endpoint: String,
    /// PEM-encoded CA bundle (already base64-decoded)
    pub certificate_authority: Vec<u8>,
}

impl ClusterConnectionInfo {
    /// Extract connection info from a control plane description
    pub fn from_description(
        cluster: &str,
        description: ClusterDescription,
    ) -> Result<Self, ResolutionError> {
        let endpoint = description
            .endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ResolutionError::MissingField {
                cluster: cluster.to_string(),
                field: "endpoint",
            })?;
        let ca_data = description
            .certificate_authority_data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ResolutionError::MissingField {
                cluster: cluster.to_string(),
                field: "certificate authority",
            })?;
        let certificate_authority = CA_ENGINE
            .decode(ca_data.trim())
            .map_err(|source| ResolutionError::InvalidCertificate {
                cluster: cluster.to_string(),
                source,
            })?;

        Ok(Self {
            endpoint,
            certificate_authority,
        })
    }
}

#[derive(Debug)]
struct CachedCluster {
    info: Arc<ClusterConnectionInfo>,
    resolved_at: Instant,
}

type Slot = Arc<OnceCell<CachedCluster>>;

/// Resolves cluster names to connection info, caching successes
///
/// With no TTL, entries live as long as the resolver. With a TTL, an entry
/// older than the TTL is resolved again on next use.
pub struct ClusterResolver<D> {
    describer: D,
    ttl: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<D: ClusterDescriber> ClusterResolver<D> {
    /// Create a resolver whose entries never expire
    pub fn new(describer: D) -> Self {
        Self::with_ttl(describer, None)
    }

    pub fn with_ttl(describer: D, ttl: Option<Duration>) -> Self {
        Self {
            describer,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a cluster, hitting the control plane only on a cache miss
    pub async fn resolve(&self, cluster: &str) -> Result<Arc<ClusterConnectionInfo>, ResolutionError> {
        if cluster.is_empty() {
            return Err(ResolutionError::EmptyClusterName);
        }

        let slot = self.slot(cluster);
        if let Some(cached) = slot.get() {
            tracing::debug!("Cluster cache HIT for {}", cluster);
            return Ok(cached.info.clone());
        }

        let result = slot
            .get_or_try_init(|| async {
                tracing::info!("Cache miss - calling EKS for {}", cluster);
                let description = self.describer.describe_cluster(cluster).await?;
                if let Some(status) = description.status.as_deref() {
                    if status != "ACTIVE" {
                        tracing::warn!("Cluster {} is in state {}", cluster, status);
                    }
                }
                let info = ClusterConnectionInfo::from_description(cluster, description)?;
                Ok::<_, ResolutionError>(CachedCluster {
                    info: Arc::new(info),
                    resolved_at: Instant::now(),
                })
            })
            .await;

        match result {
            Ok(cached) => Ok(cached.info.clone()),
            Err(e) => {
                self.release_empty_slot(cluster, &slot);
                Err(e)
            }
        }
    }

    /// Whether a resolved entry is currently cached for `cluster`
    pub fn is_cached(&self, cluster: &str) -> bool {
        let slots = self.slots.lock();
        slots
            .get(cluster)
            .and_then(|slot| slot.get())
            .is_some_and(|cached| !self.is_expired(cached, Instant::now()))
    }

    /// Number of clusters with a resolved entry
    pub fn cached_len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Drop the entry for `cluster`, forcing the next resolve to refetch
    pub fn invalidate(&self, cluster: &str) -> bool {
        let removed = self.slots.lock().remove(cluster);
        removed.is_some_and(|slot| slot.initialized())
    }

    /// Current slot for `cluster`, replacing it when expired
    fn slot(&self, cluster: &str) -> Slot {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(cluster) {
            match slot.get() {
                Some(cached) if self.is_expired(cached, now) => {
                    tracing::info!("Cluster cache entry for {} expired", cluster);
                }
                _ => return slot.clone(),
            }
        }

        let slot = Slot::default();
        slots.insert(cluster.to_string(), slot.clone());
        slot
    }

    /// Remove `slot` after a failed resolve so unknown names don't pile up.
    /// Leaves the map alone if another caller replaced or filled the slot.
    fn release_empty_slot(&self, cluster: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        let still_ours = slots
            .get(cluster)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if still_ours {
            slots.remove(cluster);
        }
    }

    fn is_expired(&self, cached: &CachedCluster, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(cached.resolved_at) >= ttl)
    }
}
