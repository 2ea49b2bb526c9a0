//! Event source collaborators: the publisher feeding the worker, and the
//! endpoint directory consulted per event.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{WebhookEndpoint, WebhookEvent};

/// Publisher that fans events out to delivery workers over a broadcast
/// channel. Fire-and-forget: the triggering caller never observes delivery
/// failures.
#[derive(Clone)]
pub struct EventPublisher {
    sender: tokio::sync::broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event to all workers. Errors are logged, not propagated.
    pub fn publish(&self, event: WebhookEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                target: "webhook_delivery",
                error = %e,
                "No active webhook workers to receive event"
            );
        }
    }

    /// Get a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}

/// Collaborator resolving which endpoints should receive an event.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Enabled endpoints of the tenant subscribed to the event type.
    async fn endpoints_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>, WebhookError>;
}

/// Registered endpoint plus its event-type subscriptions.
struct Registration {
    endpoint: WebhookEndpoint,
    /// Subscribed event types; `"*"` subscribes to everything.
    event_types: Vec<String>,
}

/// In-memory endpoint store, for embedding and tests.
#[derive(Default)]
pub struct InMemoryEndpointStore {
    registrations: RwLock<HashMap<Uuid, Vec<Registration>>>,
}

impl InMemoryEndpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint for the given event types.
    pub async fn register(&self, endpoint: WebhookEndpoint, event_types: Vec<String>) {
        let mut registrations = self.registrations.write().await;
        registrations
            .entry(endpoint.tenant_id)
            .or_default()
            .push(Registration {
                endpoint,
                event_types,
            });
    }

    /// Remove an endpoint by id.
    pub async fn remove(&self, endpoint_id: Uuid) {
        let mut registrations = self.registrations.write().await;
        for list in registrations.values_mut() {
            list.retain(|r| r.endpoint.id != endpoint_id);
        }
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn endpoints_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        let registrations = self.registrations.read().await;
        let Some(list) = registrations.get(&tenant_id) else {
            return Ok(Vec::new());
        };

        Ok(list
            .iter()
            .filter(|r| r.endpoint.enabled)
            .filter(|r| {
                r.event_types
                    .iter()
                    .any(|t| t == "*" || t == event_type)
            })
            .map(|r| r.endpoint.clone())
            .collect())
    }
}

/// Convenience: an [`Arc`]ed store shared between registration and worker.
pub type SharedEndpointStore = Arc<dyn EndpointStore>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
