use crate::service::payment_service::PaymentService;
use crate::store::{PaymentStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Active reconciliation loop. Provider webhooks can lag by minutes, so
/// every tick re-queries the gateway for payments that are still pending
/// and recent enough to be worth the calls. Older stragglers belong to the
/// maintenance sweep, which alerts instead of guessing.
pub struct PaymentPoller {
    pub store: Arc<dyn PaymentStore>,
    pub service: PaymentService,
    pub interval: Duration,
    pub lookback: chrono::Duration,
    pub batch_size: i64,
}

/// Handle owning the poller task; dropping it leaves the task running,
/// `stop` shuts it down and waits for the in-flight tick to finish.
pub struct TaskHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { shutdown, task }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("background task ended abnormally: {e}");
        }
    }
}

impl PaymentPoller {
    /// Starts the polling task. Ticks run strictly one after another: the
    /// next sleep begins only when the previous tick has returned, so a slow
    /// provider can delay polling but never stack ticks.
    pub fn spawn(self) -> TaskHandle {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            tracing::info!(
                "payment poller started (interval {:?}, lookback {}m)",
                self.interval,
                self.lookback.num_minutes()
            );
            loop {
                if let Err(e) = self.tick().await {
                    tracing::error!("payment poll tick failed: {e}");
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = rx.changed() => {
                        tracing::info!("payment poller stopping");
                        break;
                    }
                }
            }
        });
        TaskHandle::new(tx, task)
    }

    pub async fn tick(&self) -> Result<(), StoreError> {
        let cutoff = Utc::now() - self.lookback;
        let batch = self
            .store
            .list_active_for_polling(cutoff, self.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!("polling {} active payments", batch.len());
        for payment in batch {
            // Failures are swallowed here; the next tick retries and the
            // resilient client already applied retry + breaker policy.
            if let Err(e) = self.service.check_status(payment.id).await {
                tracing::warn!("status poll for payment {} failed: {e}", payment.id);
            }
        }
        Ok(())
    }
}
