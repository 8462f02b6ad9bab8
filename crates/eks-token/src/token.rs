//! Bearer token minting
//!
//! An EKS bearer token is a presigned STS `GetCallerIdentity` URL. The API
//! server's authentication webhook replays the URL against STS to learn who
//! the caller is, so the token carries proof of identity without carrying the
//! caller's secret.
//!
//! Token layout: `k8s-aws-v1.` followed by the URL-safe, unpadded base64 of
//! the presigned URL. The cluster name is bound into the signature through the
//! signed `x-k8s-aws-id` header, which stops a token minted for one cluster
//! from being accepted by another.

use std::fmt;
use std::time::{Duration, SystemTime};

use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SignatureLocation, SigningSettings,
};
use aws_sigv4::sign::v4;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;
use url::Url;

use crate::identity::{CallerIdentity, IdentityError, IdentityProvider};

/// Prefix marking the token format version
pub const TOKEN_PREFIX: &str = "k8s-aws-v1.";

/// Signed header carrying the target cluster name
pub const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";

/// Validity window of the presigned URL
pub const TOKEN_EXPIRY: Duration = Duration::from_secs(60);

const STS_SERVICE: &str = "sts";
const GET_CALLER_IDENTITY_QUERY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// Errors that can occur while minting a token
#[derive(Debug, Error)]
pub enum MintError {
    #[error("Cluster name must not be empty")]
    EmptyClusterName,

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Invalid STS endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Errors returned when a string is not a well-formed bearer token
#[derive(Debug, Error)]
pub enum TokenFormatError {
    #[error("Missing k8s-aws-v1. prefix")]
    MissingPrefix,

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Payload is not a URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A minted bearer token
///
/// Debug output is redacted; use [`BearerToken::as_str`] to present it.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    fn from_presigned_url(url: &Url) -> Self {
        Self(format!(
            "{}{}",
            TOKEN_PREFIX,
            URL_SAFE_NO_PAD.encode(url.as_str())
        ))
    }

    /// Wrap an existing token string, checking its format
    pub fn parse(token: impl Into<String>) -> Result<Self, TokenFormatError> {
        let token = Self(token.into());
        token.presigned_url()?;
        Ok(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the presigned STS URL the token wraps
    pub fn presigned_url(&self) -> Result<Url, TokenFormatError> {
        let payload = self
            .0
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(TokenFormatError::MissingPrefix)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload)?;
        Ok(Url::parse(&String::from_utf8(bytes)?)?)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken").field(&"<redacted>").finish()
    }
}

/// Mints bearer tokens from an injected identity
///
/// Every call produces a fresh token; nothing is cached.
pub struct TokenMinter<I> {
    identity: I,
}

impl<I: IdentityProvider> TokenMinter<I> {
    pub fn new(identity: I) -> Self {
        Self { identity }
    }

    /// Mint a token for `cluster_name`, signed now
    pub async fn mint(&self, cluster_name: &str) -> Result<BearerToken, MintError> {
        self.mint_at(cluster_name, SystemTime::now()).await
    }

    /// Mint a token for `cluster_name` with an explicit signing time
    pub async fn mint_at(
        &self,
        cluster_name: &str,
        signing_time: SystemTime,
    ) -> Result<BearerToken, MintError> {
        if cluster_name.is_empty() {
            return Err(MintError::EmptyClusterName);
        }

        let identity = self.identity.caller_identity().await?;
        let url = presign_caller_identity(&identity, cluster_name, signing_time)?;
        tracing::debug!(
            "Minted token for cluster {} (region {}, expires in {:?})",
            cluster_name,
            identity.region,
            TOKEN_EXPIRY
        );

        Ok(BearerToken::from_presigned_url(&url))
    }
}

/// STS endpoint for a region
fn sts_endpoint(region: &str) -> String {
    if region.starts_with("cn-") {
        format!("https://sts.{}.amazonaws.com.cn/", region)
    } else {
        format!("https://sts.{}.amazonaws.com/", region)
    }
}

/// Presign `GetCallerIdentity` with the cluster header in the signed set
fn presign_caller_identity(
    caller: &CallerIdentity,
    cluster_name: &str,
    signing_time: SystemTime,
) -> Result<Url, MintError> {
    let mut url = Url::parse(&format!(
        "{}?{}",
        sts_endpoint(&caller.region),
        GET_CALLER_IDENTITY_QUERY
    ))?;

    let identity = caller.credentials.clone().into();
    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.expires_in = Some(TOKEN_EXPIRY);

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(&caller.region)
        .name(STS_SERVICE)
        .time(signing_time)
        .settings(settings)
        .build()
        .map_err(|e| MintError::Signing(e.to_string()))?
        .into();

    let headers = [(CLUSTER_ID_HEADER, cluster_name)];
    let signable = SignableRequest::new(
        "GET",
        url.as_str(),
        headers.into_iter(),
        SignableBody::Bytes(&[]),
    )
    .map_err(|e| MintError::Signing(e.to_string()))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| MintError::Signing(e.to_string()))?
        .into_parts();
    let (_headers, query_params) = instructions.into_parts();

    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &query_params {
            pairs.append_pair(name, value);
        }
    }

    Ok(url)
}
