//! Configuration and credentials for CDN access.
//!
//! Credentials are deliberately fetched through a [`CredentialProvider`] on
//! every dispatch instead of being cached: each purge/preload task is an
//! independent queue invocation, and the owning application may rotate
//! credentials between invocations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// API credentials for the CDN zone.
///
/// All three fields are required non-empty for any CDN call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email sent as `X-Auth-Email`.
    pub email: String,
    /// API key sent as `X-Auth-Key`.
    pub api_key: String,
    /// Zone identifier, part of every API path.
    pub zone_id: String,
}

impl Credentials {
    pub fn new(
        email: impl Into<String>,
        api_key: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
            zone_id: zone_id.into(),
        }
    }

    /// True when every field is non-empty.
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.api_key.is_empty() && !self.zone_id.is_empty()
    }
}

/// Source of CDN credentials, queried fresh on every dispatch.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials>;
}

/// Provider backed by a fixed credentials record.
pub struct StaticCredentials(pub Credentials);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl CredentialProvider for Arc<dyn CredentialProvider> {
    async fn credentials(&self) -> Result<Credentials> {
        self.as_ref().credentials().await
    }
}

/// Crate-wide configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Base URL of the CDN API.
    pub api_base: String,

    /// Maximum number of URLs per purge API call.
    pub max_urls_per_batch: usize,

    /// Timeout for each purge API call.
    pub purge_timeout: Duration,

    /// Timeout for the synchronous whole-zone clear call.
    pub purge_everything_timeout: Duration,

    /// Timeout for each preload GET against the origin.
    pub preload_timeout: Duration,

    /// Whether preload fetches validate the origin's TLS certificate.
    ///
    /// Preload targets are often an internal origin with a self-signed
    /// certificate. Disabling validation is an explicit trust decision the
    /// caller must opt into; the default is to validate.
    pub verify_tls: bool,

    /// User-Agent header on preload fetches, so origin logs can tell warmer
    /// traffic from visitors.
    pub preload_user_agent: String,

    /// Lower bound of the computed preload concurrency degree.
    pub min_concurrency: usize,

    /// Upper bound of the computed preload concurrency degree. This protects
    /// the origin, not just the dispatching host.
    pub max_concurrency: usize,

    /// Base URL of the site whose cache is being managed. Used for sitemap
    /// discovery.
    pub origin_base: Option<String>,

    /// Explicit sitemap URL. When absent, discovery probes well-known paths
    /// under `origin_base`.
    pub sitemap_url: Option<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudflare.com/client/v4".to_string(),
            max_urls_per_batch: 30,
            purge_timeout: Duration::from_secs(30),
            purge_everything_timeout: Duration::from_secs(30),
            preload_timeout: Duration::from_secs(5),
            verify_tls: true,
            preload_user_agent: "Cache Preloader".to_string(),
            min_concurrency: 1,
            max_concurrency: 10,
            origin_base: None,
            sitemap_url: None,
        }
    }
}

impl SweepConfig {
    /// URL of the purge endpoint for a zone.
    pub fn purge_endpoint(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/purge_cache", self.api_base, zone_id)
    }

    /// URL of the zone detail endpoint, used for credential verification.
    pub fn zone_endpoint(&self, zone_id: &str) -> String {
        format!("{}/zones/{}", self.api_base, zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_completeness() {
        assert!(Credentials::new("a@b.c", "key", "zone").is_complete());
        assert!(!Credentials::new("", "key", "zone").is_complete());
        assert!(!Credentials::new("a@b.c", "", "zone").is_complete());
        assert!(!Credentials::new("a@b.c", "key", "").is_complete());
    }

    #[test]
    fn endpoints_are_built_from_api_base() {
        let config = SweepConfig::default();
        assert_eq!(
            config.purge_endpoint("abc123"),
            "https://api.cloudflare.com/client/v4/zones/abc123/purge_cache"
        );
        assert_eq!(
            config.zone_endpoint("abc123"),
            "https://api.cloudflare.com/client/v4/zones/abc123"
        );
    }
}
