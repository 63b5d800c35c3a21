use crate::domain::payment::{Payment, PaymentStatus};
use crate::metrics::{Counter, MetricsSink};
use crate::service::notifier::NotificationDispatcher;
use crate::store::{CommitOutcome, PaymentStore, StoreError, TransitionUpdate};
use std::sync::Arc;

/// Where a candidate transition came from. Both reconciliation channels and
/// the explicit user paths funnel through the same applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    Create,
    Webhook,
    Poll,
    UserCancel,
}

impl TransitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionSource::Create => "create",
            TransitionSource::Webhook => "webhook",
            TransitionSource::Poll => "poll",
            TransitionSource::UserCancel => "user_cancel",
        }
    }
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Committed(Payment),
    /// Requested status equals the stored one; at-least-once redelivery.
    Replayed,
    /// Illegal edge per the transition table; stored state untouched.
    Rejected,
    /// Another writer committed first; this update was dropped.
    LostRace,
}

/// Signal consumed by the order subsystem when a payment reaches a terminal
/// state (updates order-level display status on their side).
#[async_trait::async_trait]
pub trait OrderSink: Send + Sync {
    async fn payment_terminal(&self, payment: &Payment) -> anyhow::Result<()>;
}

pub struct LoggingOrderSink;

#[async_trait::async_trait]
impl OrderSink for LoggingOrderSink {
    async fn payment_terminal(&self, payment: &Payment) -> anyhow::Result<()> {
        tracing::info!(
            "order {} payment {} reached {}",
            payment.order_id,
            payment.id,
            payment.status
        );
        Ok(())
    }
}

/// Sole authority over payment status. Validates candidate transitions
/// against the table, commits them with a compare-and-set write, and owns
/// every side effect (metrics, order signal, admin notification). Everything
/// else in the crate only ever *proposes* transitions.
#[derive(Clone)]
pub struct TransitionApplier {
    pub store: Arc<dyn PaymentStore>,
    pub notifier: NotificationDispatcher,
    pub orders: Arc<dyn OrderSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl TransitionApplier {
    pub async fn apply(
        &self,
        payment: &Payment,
        requested: PaymentStatus,
        source: TransitionSource,
        error_message: Option<String>,
    ) -> Result<ApplyOutcome, StoreError> {
        if payment.status == requested {
            tracing::debug!(
                "payment {} already {}, {} delivery replayed",
                payment.id,
                requested,
                source.as_str()
            );
            return Ok(ApplyOutcome::Replayed);
        }

        if !payment.status.can_transition_to(requested) {
            tracing::warn!(
                "inconsistent transition {} -> {} for payment {} from {}, ignoring",
                payment.status,
                requested,
                payment.id,
                source.as_str()
            );
            self.metrics.increment(Counter::TransitionsRejected);
            return Ok(ApplyOutcome::Rejected);
        }

        let outcome = self
            .store
            .commit_transition(TransitionUpdate {
                payment_id: payment.id,
                expected: payment.status,
                new_status: requested,
                error_message,
            })
            .await?;

        let (committed, notification_claimed) = match outcome {
            CommitOutcome::LostRace => {
                // The other writer already reached a valid state; nothing to do.
                tracing::debug!(
                    "payment {} changed under {} delivery, dropping update",
                    payment.id,
                    source.as_str()
                );
                return Ok(ApplyOutcome::LostRace);
            }
            CommitOutcome::Committed {
                payment,
                notification_claimed,
            } => (payment, notification_claimed),
        };

        tracing::info!(
            "payment {} status {} -> {} via {}",
            committed.id,
            payment.status,
            committed.status,
            source.as_str()
        );

        match committed.status {
            PaymentStatus::Succeeded => self.metrics.increment(Counter::PaymentsSucceeded),
            PaymentStatus::Cancelled => self.metrics.increment(Counter::PaymentsCancelled),
            PaymentStatus::Failed => self.metrics.increment(Counter::PaymentsFailed),
            _ => {}
        }

        if committed.status.is_terminal() {
            if let Err(e) = self.orders.payment_terminal(&committed).await {
                tracing::warn!(
                    "order sink rejected terminal signal for payment {}: {e}",
                    committed.id
                );
            }
            if notification_claimed {
                self.notifier.dispatch_terminal(&committed);
            }
        }

        Ok(ApplyOutcome::Committed(committed))
    }
}
