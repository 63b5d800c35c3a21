use crate::domain::payment::{Payment, PaymentStatus};
use crate::store::{CommitOutcome, NewPayment, PaymentStore, StoreError, TransitionUpdate};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Hash-map backed store with the same conditional-write semantics as the
/// Postgres implementation. Used by the test suite and handy for local runs
/// without a database.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<Uuid, Payment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Payment>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test helper: rewrites a payment's creation time so lookback windows
    /// can be exercised without waiting.
    pub fn backdate_created(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(row) = self.lock().get_mut(&id) {
            row.created_at = created_at;
        }
    }
}

#[async_trait::async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert(&self, new_payment: NewPayment) -> Result<Payment, StoreError> {
        let now = Utc::now();
        let payment = Payment {
            id: new_payment.id,
            provider_payment_id: None,
            order_id: new_payment.order_id,
            status: PaymentStatus::Pending,
            method: new_payment.method,
            amount_minor: new_payment.amount_minor,
            currency: new_payment.currency,
            bank_id: new_payment.bank_id,
            confirmation_url: None,
            idempotence_key: new_payment.idempotence_key,
            error_message: None,
            notified: false,
            stale_alerted_at: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        self.lock().insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .lock()
            .values()
            .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id))
            .cloned())
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = self
            .lock()
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn order_has_succeeded_payment(&self, order_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .values()
            .any(|p| p.order_id == order_id && p.status == PaymentStatus::Succeeded))
    }

    async fn record_provider_details(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        confirmation_url: Option<&str>,
    ) -> Result<Payment, StoreError> {
        let mut rows = self.lock();
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if row.provider_payment_id.is_none() {
            row.provider_payment_id = Some(provider_payment_id.to_string());
            row.confirmation_url = confirmation_url.map(ToString::to_string);
            row.updated_at = Utc::now();
        }
        Ok(row.clone())
    }

    async fn list_active_for_polling(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = self
            .lock()
            .values()
            .filter(|p| {
                !p.status.is_terminal()
                    && p.provider_payment_id.is_some()
                    && p.created_at >= created_after
            })
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments.truncate(limit.max(0) as usize);
        Ok(payments)
    }

    async fn list_stale_active(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = self
            .lock()
            .values()
            .filter(|p| {
                !p.status.is_terminal()
                    && p.created_at < created_before
                    && p.stale_alerted_at.is_none()
            })
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments.truncate(limit.max(0) as usize);
        Ok(payments)
    }

    async fn mark_stale_alerted(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.lock();
        match rows.get_mut(&id) {
            Some(row) if row.stale_alerted_at.is_none() => {
                row.stale_alerted_at = Some(Utc::now());
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_transition(
        &self,
        update: TransitionUpdate,
    ) -> Result<CommitOutcome, StoreError> {
        let mut rows = self.lock();
        let row = rows
            .get_mut(&update.payment_id)
            .ok_or(StoreError::NotFound(update.payment_id))?;

        if row.status != update.expected {
            return Ok(CommitOutcome::LostRace);
        }

        let now = Utc::now();
        row.status = update.new_status;
        if let Some(message) = update.error_message {
            row.error_message = Some(message);
        }
        if update.new_status == PaymentStatus::Succeeded && row.paid_at.is_none() {
            row.paid_at = Some(now);
        }
        let notification_claimed = update.new_status.is_terminal();
        if notification_claimed {
            row.notified = true;
        }
        row.updated_at = now;

        Ok(CommitOutcome::Committed {
            payment: row.clone(),
            notification_claimed,
        })
    }

    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.lock();
        let before = rows.len();
        rows.retain(|_, p| {
            !(matches!(p.status, PaymentStatus::Failed | PaymentStatus::Cancelled)
                && p.created_at < cutoff)
        });
        Ok((before - rows.len()) as u64)
    }
}
