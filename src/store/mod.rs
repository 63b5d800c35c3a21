use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("payment {0} not found")]
    NotFound(Uuid),
    #[error("corrupt payment row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub order_id: i64,
    pub method: PaymentMethod,
    pub amount_minor: i64,
    pub currency: String,
    pub bank_id: Option<String>,
    pub idempotence_key: String,
}

/// A candidate status change, carrying the status the caller observed before
/// deciding the transition was legal. The store commits only if the row still
/// holds `expected`.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub payment_id: Uuid,
    pub expected: PaymentStatus,
    pub new_status: PaymentStatus,
    pub error_message: Option<String>,
}

#[derive(Debug)]
pub enum CommitOutcome {
    /// The conditional write landed. `notification_claimed` is true when this
    /// write entered a terminal status and took the durable notified flag.
    Committed {
        payment: Payment,
        notification_claimed: bool,
    },
    /// Another writer changed the row first; the update was dropped.
    LostRace,
}

#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, new_payment: NewPayment) -> Result<Payment, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn find_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError>;

    async fn order_has_succeeded_payment(&self, order_id: i64) -> Result<bool, StoreError>;

    /// Records the provider's creation result. Writes only if the row has no
    /// provider payment id yet; the id is set at most once, by the creation
    /// call, never by webhook or poll.
    async fn record_provider_details(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        confirmation_url: Option<&str>,
    ) -> Result<Payment, StoreError>;

    /// Non-terminal payments with a provider id created after the cutoff,
    /// oldest first.
    async fn list_active_for_polling(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Non-terminal payments older than the cutoff that have not been
    /// flagged by the stale sweep yet.
    async fn list_stale_active(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Claims the stale-alert mark; returns false if already claimed.
    async fn mark_stale_alerted(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn commit_transition(&self, update: TransitionUpdate)
        -> Result<CommitOutcome, StoreError>;

    /// Retention cleanup: deletes FAILED/CANCELLED rows created before the
    /// cutoff. Returns how many were removed.
    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
