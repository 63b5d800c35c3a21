use crate::service::notifier::NotificationDispatcher;
use crate::service::poller::TaskHandle;
use crate::store::{PaymentStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Low-frequency housekeeping: alerts on payments the poller no longer
/// scans, and purges old terminal records. Stale payments are flagged for a
/// human, never auto-cancelled; the payment may have succeeded upstream
/// while both channels missed it.
pub struct MaintenanceLoop {
    pub store: Arc<dyn PaymentStore>,
    pub notifier: NotificationDispatcher,
    pub interval: Duration,
    pub stale_after: chrono::Duration,
    pub retention: chrono::Duration,
    pub batch_size: i64,
}

impl MaintenanceLoop {
    pub fn spawn(self) -> TaskHandle {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            tracing::info!(
                "maintenance loop started (interval {:?}, retention {}d)",
                self.interval,
                self.retention.num_days()
            );
            loop {
                if let Err(e) = self.tick().await {
                    tracing::error!("maintenance tick failed: {e}");
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = rx.changed() => {
                        tracing::info!("maintenance loop stopping");
                        break;
                    }
                }
            }
        });
        TaskHandle::new(tx, task)
    }

    pub async fn tick(&self) -> Result<(), StoreError> {
        self.sweep_stale().await?;
        self.purge_expired().await?;
        Ok(())
    }

    async fn sweep_stale(&self) -> Result<(), StoreError> {
        let cutoff = Utc::now() - self.stale_after;
        let stale = self.store.list_stale_active(cutoff, self.batch_size).await?;
        for payment in stale {
            // The mark is conditional, so restarts and overlapping deploys
            // still produce a single alert per payment.
            if self.store.mark_stale_alerted(payment.id).await? {
                let age_minutes = (Utc::now() - payment.created_at).num_minutes();
                tracing::warn!(
                    "payment {} for order {} stuck in {} for {}m",
                    payment.id,
                    payment.order_id,
                    payment.status,
                    age_minutes
                );
                self.notifier.payment_stale(&payment, age_minutes);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<(), StoreError> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.store.purge_terminal_older_than(cutoff).await?;
        if purged > 0 {
            tracing::info!("purged {purged} terminal payments past retention");
        }
        Ok(())
    }
}
