//! Kubernetes integration module
//!
//! Provides per-request client sessions and the pod count query.

pub mod client;
pub mod session;

pub use client::{ApiServerPodCounter, KubeClient, KubeClientError, PodCounter};
pub use session::{ClientConfigError, ClientSessionBuilder, EphemeralClientConfig};
