use crate::domain::payment::{parse_amount, PaymentStatus};
use crate::metrics::{Counter, MetricsSink};
use crate::service::applier::{TransitionApplier, TransitionSource};
use crate::store::{PaymentStore, StoreError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: Option<String>,
    pub amount: Option<WebhookAmount>,
    pub cancellation_details: Option<CancellationDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookAmount {
    pub value: String,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancellationDetails {
    pub party: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Event was mapped to a local payment and handed to the applier.
    Applied,
    /// Irrelevant event type; acknowledged to stop redelivery.
    Ignored,
    /// No local payment with that provider id; acknowledged.
    UnknownPayment,
}

/// Maps provider push events onto local payments and forwards candidate
/// transitions. Delivery is at-least-once and may race the poller for the
/// same payment; no dedup happens here, the applier's conditional write is
/// the idempotency point.
#[derive(Clone)]
pub struct WebhookIngest {
    pub store: Arc<dyn PaymentStore>,
    pub applier: TransitionApplier,
    pub metrics: Arc<dyn MetricsSink>,
}

impl WebhookIngest {
    pub async fn process(&self, event: WebhookEvent) -> Result<WebhookDisposition, StoreError> {
        self.metrics.increment(Counter::WebhooksReceived);
        let started = Instant::now();
        let result = self.handle(event).await;
        self.metrics
            .record_webhook_latency(started.elapsed().as_millis() as u64);
        match &result {
            Ok(_) => self.metrics.increment(Counter::WebhooksProcessed),
            Err(_) => self.metrics.increment(Counter::WebhooksFailed),
        }
        result
    }

    async fn handle(&self, event: WebhookEvent) -> Result<WebhookDisposition, StoreError> {
        let implied = match event.event.as_str() {
            "payment.succeeded" => PaymentStatus::Succeeded,
            "payment.canceled" => PaymentStatus::Cancelled,
            "payment.waiting_for_capture" => PaymentStatus::WaitingForCapture,
            other => {
                tracing::debug!("ignoring provider event {other}");
                return Ok(WebhookDisposition::Ignored);
            }
        };

        // object.status is authoritative when present; the event name is the
        // fallback for older payload shapes.
        let status = event
            .object
            .status
            .as_deref()
            .and_then(PaymentStatus::from_provider)
            .unwrap_or(implied);

        let Some(payment) = self.store.find_by_provider_id(&event.object.id).await? else {
            tracing::warn!(
                "webhook for unknown provider payment {}, acknowledging",
                event.object.id
            );
            return Ok(WebhookDisposition::UnknownPayment);
        };

        if let Some(amount) = &event.object.amount {
            if let Some(minor) = parse_amount(&amount.value) {
                if minor != payment.amount_minor {
                    tracing::warn!(
                        "webhook amount {} does not match stored amount {} for payment {}",
                        minor,
                        payment.amount_minor,
                        payment.id
                    );
                }
            }
        }

        let error_message = event
            .object
            .cancellation_details
            .and_then(|d| d.reason)
            .filter(|_| status.is_terminal() && status != PaymentStatus::Succeeded);

        self.applier
            .apply(&payment, status, TransitionSource::Webhook, error_message)
            .await?;

        Ok(WebhookDisposition::Applied)
    }
}
