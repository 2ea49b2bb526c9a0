//! Background worker consuming published events and fanning them out.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::delivery::DeliveryEngine;
use crate::events::EndpointStore;
use crate::models::WebhookEvent;

/// Worker that drives deliveries for every published event.
///
/// Consumes the publisher's broadcast channel, resolves matching endpoints
/// through the [`EndpointStore`], and hands the batch to the engine. Runs
/// until the channel closes or the shutdown token fires.
pub struct WebhookWorker {
    engine: DeliveryEngine,
    store: Arc<dyn EndpointStore>,
    receiver: broadcast::Receiver<WebhookEvent>,
    shutdown: CancellationToken,
}

impl WebhookWorker {
    pub fn new(
        engine: DeliveryEngine,
        store: Arc<dyn EndpointStore>,
        receiver: broadcast::Receiver<WebhookEvent>,
    ) -> Self {
        Self {
            engine,
            store,
            receiver,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run the delivery loop to completion.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!(target: "webhook_delivery", "Worker shutting down");
                    return;
                }
                received = self.receiver.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "webhook_delivery",
                            skipped,
                            "Worker lagged behind event publisher; events dropped"
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(target: "webhook_delivery", "Event channel closed; worker stopping");
                        return;
                    }
                },
            };

            self.handle_event(event).await;
        }
    }

    async fn handle_event(&self, event: WebhookEvent) {
        let endpoints = match self
            .store
            .endpoints_for_event(event.tenant_id, &event.event_type)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Failed to resolve endpoints for event"
                );
                return;
            }
        };

        if endpoints.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.event_id,
                event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                "No endpoints subscribed to event type"
            );
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            endpoint_count = endpoints.len(),
            "Delivering event to subscribed endpoints"
        );

        self.engine.deliver_all(endpoints, &event).await;
    }
}
