//! Cluster connection metadata
//!
//! Resolves cluster names to API endpoints and CA bundles through the EKS
//! control plane and caches the results for the life of the process.

pub mod eks;
pub mod resolver;

pub use eks::{ClusterDescriber, ClusterDescription, EksControlPlane};
pub use resolver::{ClusterConnectionInfo, ClusterResolver, ResolutionError};
