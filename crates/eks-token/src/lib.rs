//! EKS bearer token minting
//!
//! This crate turns an AWS caller identity into a short-lived bearer token
//! accepted by EKS API servers (the `aws-iam-authenticator` token format).

pub mod identity;
pub mod token;

pub use identity::{AmbientIdentity, CallerIdentity, IdentityError, IdentityProvider, StaticIdentity};
pub use token::{BearerToken, MintError, TokenFormatError, TokenMinter, CLUSTER_ID_HEADER, TOKEN_EXPIRY, TOKEN_PREFIX};
