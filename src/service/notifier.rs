use crate::domain::payment::{format_amount, Payment, PaymentStatus};
use std::sync::Arc;
use std::time::Duration;

/// Administrative notification channel (Telegram bot, pager, ...). External
/// collaborator; the engine only ever calls `send`.
#[async_trait::async_trait]
pub trait AdminChannel: Send + Sync {
    async fn send(&self, order_id: i64, message: &str) -> anyhow::Result<()>;
}

/// Default channel for deployments without a wired admin transport.
pub struct LoggingAdminChannel;

#[async_trait::async_trait]
impl AdminChannel for LoggingAdminChannel {
    async fn send(&self, order_id: i64, message: &str) -> anyhow::Result<()> {
        tracing::info!("admin notification for order {order_id}: {message}");
        Ok(())
    }
}

/// Sends admin notifications detached from the payment write path. Delivery
/// failures are retried a bounded number of times and logged; they never
/// propagate back into payment state. Dedup is not handled here: the applier
/// only dispatches when its conditional write claimed the notified flag.
#[derive(Clone)]
pub struct NotificationDispatcher {
    channel: Arc<dyn AdminChannel>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(channel: Arc<dyn AdminChannel>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            channel,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Terminal-outcome notification; invoked by the applier for the writer
    /// that won the terminal transition.
    pub fn dispatch_terminal(&self, payment: &Payment) {
        let message = match payment.status {
            PaymentStatus::Succeeded => format!(
                "payment {} for order #{} paid: {} {} via {}",
                payment.id,
                payment.order_id,
                format_amount(payment.amount_minor),
                payment.currency,
                payment.method.label(),
            ),
            PaymentStatus::Cancelled | PaymentStatus::Failed => format!(
                "payment {} for order #{} {}: {}; order will not be processed",
                payment.id,
                payment.order_id,
                if payment.status == PaymentStatus::Cancelled {
                    "cancelled"
                } else {
                    "failed"
                },
                payment.error_message.as_deref().unwrap_or("no reason given"),
            ),
            _ => return,
        };
        self.spawn_send(payment.order_id, message);
    }

    /// Hook for the order subsystem: cash orders are announced right away
    /// since no gateway confirmation will ever arrive for them.
    pub fn order_placed_with_cash(&self, order_id: i64, amount_minor: i64, currency: &str) {
        let message = format!(
            "order #{order_id} placed, cash on delivery: {} {currency}",
            format_amount(amount_minor),
        );
        self.spawn_send(order_id, message);
    }

    /// Stale-payment alert from the timeout sweep.
    pub fn payment_stale(&self, payment: &Payment, age_minutes: i64) {
        let message = format!(
            "payment {} for order #{} still {} after {age_minutes} minutes, manual check required",
            payment.id, payment.order_id, payment.status,
        );
        self.spawn_send(payment.order_id, message);
    }

    fn spawn_send(&self, order_id: i64, message: String) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.send_with_retry(order_id, &message).await;
        });
    }

    async fn send_with_retry(&self, order_id: i64, message: &str) {
        for attempt in 1..=self.max_attempts {
            match self.channel.send(order_id, message).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        "admin notification attempt {attempt}/{} for order {order_id} failed: {e}",
                        self.max_attempts
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        tracing::error!("giving up on admin notification for order {order_id}");
    }
}
