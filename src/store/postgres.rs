use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::store::{CommitOutcome, NewPayment, PaymentStore, StoreError, TransitionUpdate};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, provider_payment_id, order_id, status, method, amount_minor, \
     currency, bank_id, confirmation_url, idempotence_key, error_message, notified, \
     stale_alerted_at, created_at, updated_at, paid_at";

#[derive(Clone)]
pub struct PgPaymentStore {
    pub pool: PgPool,
}

fn row_to_payment(row: PgRow) -> Result<Payment, StoreError> {
    let raw_status: String = row.get("status");
    let status = PaymentStatus::parse(&raw_status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown status {raw_status}")))?;
    let raw_method: String = row.get("method");
    let method = PaymentMethod::parse(&raw_method)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown method {raw_method}")))?;

    Ok(Payment {
        id: row.get("id"),
        provider_payment_id: row.get("provider_payment_id"),
        order_id: row.get("order_id"),
        status,
        method,
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        bank_id: row.get("bank_id"),
        confirmation_url: row.get("confirmation_url"),
        idempotence_key: row.get("idempotence_key"),
        error_message: row.get("error_message"),
        notified: row.get("notified"),
        stale_alerted_at: row.get("stale_alerted_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        paid_at: row.get("paid_at"),
    })
}

#[async_trait::async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, new_payment: NewPayment) -> Result<Payment, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, order_id, status, method, amount_minor, currency, bank_id, idempotence_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(new_payment.id)
        .bind(new_payment.order_id)
        .bind(PaymentStatus::Pending.as_str())
        .bind(new_payment.method.as_str())
        .bind(new_payment.amount_minor)
        .bind(&new_payment.currency)
        .bind(&new_payment.bank_id)
        .bind(&new_payment.idempotence_key)
        .fetch_one(&self.pool)
        .await?;

        row_to_payment(row)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_payment).transpose()
    }

    async fn find_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_payment_id = $1"
        ))
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn order_has_succeeded_payment(&self, order_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE order_id = $1 AND status = 'SUCCEEDED') AS paid",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("paid"))
    }

    async fn record_provider_details(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        confirmation_url: Option<&str>,
    ) -> Result<Payment, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET provider_payment_id = $2, confirmation_url = $3, updated_at = now()
            WHERE id = $1 AND provider_payment_id IS NULL
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(provider_payment_id)
        .bind(confirmation_url)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_payment(row),
            // Already recorded (idempotence-key replay); return the row as is.
            None => self.find(id).await?.ok_or(StoreError::NotFound(id)),
        }
    }

    async fn list_active_for_polling(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status IN ('PENDING', 'WAITING_FOR_CAPTURE')
              AND provider_payment_id IS NOT NULL
              AND created_at >= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        ))
        .bind(created_after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn list_stale_active(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status IN ('PENDING', 'WAITING_FOR_CAPTURE')
              AND created_at < $1
              AND stale_alerted_at IS NULL
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn mark_stale_alerted(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payments SET stale_alerted_at = now(), updated_at = now() WHERE id = $1 AND stale_alerted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_transition(
        &self,
        update: TransitionUpdate,
    ) -> Result<CommitOutcome, StoreError> {
        let claim_notification = update.new_status.is_terminal();
        // Single conditional UPDATE: status, paid_at, error_message,
        // updated_at and the notified claim land atomically or not at all.
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = $3,
                error_message = COALESCE($4, error_message),
                paid_at = CASE WHEN $3 = 'SUCCEEDED' AND paid_at IS NULL THEN now() ELSE paid_at END,
                notified = CASE WHEN $5 THEN TRUE ELSE notified END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(update.payment_id)
        .bind(update.expected.as_str())
        .bind(update.new_status.as_str())
        .bind(&update.error_message)
        .bind(claim_notification)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(CommitOutcome::Committed {
                payment: row_to_payment(row)?,
                notification_claimed: claim_notification,
            }),
            None => Ok(CommitOutcome::LostRace),
        }
    }

    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM payments WHERE status IN ('FAILED', 'CANCELLED') AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
