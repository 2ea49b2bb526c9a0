//! Engine configuration.

use crate::models::PayloadMetadata;
use crate::secret::SigningPolicy;

/// Default bound on concurrent sends during batch fan-out.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Configuration for [`crate::delivery::DeliveryEngine`].
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// `User-Agent` sent with every delivery.
    pub user_agent: String,
    /// `metadata.source` in the wire envelope.
    pub source: String,
    /// `metadata.version` in the wire envelope.
    pub version: String,
    /// Whether the envelope carries the metadata block at all.
    pub include_metadata: bool,
    /// Allow plain-HTTP endpoint URLs (dev/test only).
    pub allow_http: bool,
    /// Reject URLs that resolve to loopback, private, or link-local hosts.
    pub block_internal_hosts: bool,
    /// Concurrency bound for batch fan-out across endpoints.
    pub max_concurrency: usize,
    /// What to do when no signing secret resolves for an endpoint.
    pub signing_policy: SigningPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("clubify-webhooks/{}", env!("CARGO_PKG_VERSION")),
            source: "clubify-checkout".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            include_metadata: true,
            allow_http: false,
            block_internal_hosts: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            signing_policy: SigningPolicy::Required,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    #[must_use]
    pub fn with_block_internal_hosts(mut self, block: bool) -> Self {
        self.block_internal_hosts = block;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_signing_policy(mut self, policy: SigningPolicy) -> Self {
        self.signing_policy = policy;
        self
    }

    #[must_use]
    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }

    /// Envelope metadata block, when enabled.
    pub fn metadata(&self) -> Option<PayloadMetadata> {
        self.include_metadata.then(|| PayloadMetadata {
            user_agent: self.user_agent.clone(),
            source: self.source.clone(),
            version: self.version.clone(),
        })
    }
}
