//! Per-tenant signing secret resolution.
//!
//! Two strategies, composable with a global fallback:
//! - [`CallbackResolver`]: caller supplies a function over the context.
//! - [`DirectoryResolver`]: reads a configured key out of the tenant's
//!   settings via the [`TenantDirectory`] collaborator.
//!
//! Resolution order is tenant-specific first, fallback second. What happens
//! when nothing resolves is governed by [`SigningPolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WebhookError;

/// Default key looked up in tenant settings by [`DirectoryResolver`].
pub const DEFAULT_SETTINGS_KEY: &str = "webhook_secret";

/// Policy for deliveries when no signing secret resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningPolicy {
    /// Fail the delivery terminally with a configuration error.
    #[default]
    Required,
    /// Send the request without a signature header.
    AllowUnsigned,
}

/// Identifies the tenant/endpoint a secret is being resolved for.
#[derive(Debug, Clone, Default)]
pub struct SecretContext {
    pub tenant_id: Option<Uuid>,
    pub endpoint_id: Option<Uuid>,
}

impl SecretContext {
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            endpoint_id: None,
        }
    }
}

/// Resolves the secret used to sign (or verify) a payload.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Returns `Ok(None)` when no secret is known for the context.
    async fn resolve(&self, ctx: &SecretContext) -> Result<Option<String>, WebhookError>;
}

/// Resolver that never yields a secret; endpoints must carry their own.
pub struct NullResolver;

#[async_trait]
impl SecretResolver for NullResolver {
    async fn resolve(&self, _ctx: &SecretContext) -> Result<Option<String>, WebhookError> {
        Ok(None)
    }
}

/// Strategy A: a caller-supplied function over the context.
#[derive(Clone)]
pub struct CallbackResolver {
    callback: Arc<dyn Fn(&SecretContext) -> Option<String> + Send + Sync>,
}

impl CallbackResolver {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&SecretContext) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }
}

#[async_trait]
impl SecretResolver for CallbackResolver {
    async fn resolve(&self, ctx: &SecretContext) -> Result<Option<String>, WebhookError> {
        Ok((self.callback)(ctx))
    }
}

/// Collaborator that maps a tenant to its settings document.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant_settings(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<serde_json::Value>, WebhookError>;
}

/// Strategy B: convention lookup in tenant settings.
pub struct DirectoryResolver {
    directory: Arc<dyn TenantDirectory>,
    settings_key: String,
}

impl DirectoryResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            settings_key: DEFAULT_SETTINGS_KEY.to_string(),
        }
    }

    /// Override the settings key read from the tenant record.
    #[must_use]
    pub fn with_settings_key(mut self, key: impl Into<String>) -> Self {
        self.settings_key = key.into();
        self
    }
}

#[async_trait]
impl SecretResolver for DirectoryResolver {
    async fn resolve(&self, ctx: &SecretContext) -> Result<Option<String>, WebhookError> {
        let Some(tenant_id) = ctx.tenant_id else {
            return Ok(None);
        };

        let Some(settings) = self.directory.tenant_settings(tenant_id).await? else {
            return Ok(None);
        };

        Ok(settings
            .get(&self.settings_key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned))
    }
}

/// Decorator applying a global fallback after tenant-specific resolution.
pub struct FallbackResolver {
    inner: Arc<dyn SecretResolver>,
    fallback: Option<String>,
}

impl FallbackResolver {
    pub fn new(inner: Arc<dyn SecretResolver>, fallback: Option<String>) -> Self {
        Self { inner, fallback }
    }
}

#[async_trait]
impl SecretResolver for FallbackResolver {
    async fn resolve(&self, ctx: &SecretContext) -> Result<Option<String>, WebhookError> {
        if let Some(secret) = self.inner.resolve(ctx).await? {
            return Ok(Some(secret));
        }
        Ok(self.fallback.clone())
    }
}

/// In-memory tenant directory, for embedding and tests.
#[derive(Default)]
pub struct StaticTenantDirectory {
    settings: HashMap<Uuid, serde_json::Value>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: Uuid, settings: serde_json::Value) -> Self {
        self.settings.insert(tenant_id, settings);
        self
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn tenant_settings(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<serde_json::Value>, WebhookError> {
        Ok(self.settings.get(&tenant_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
