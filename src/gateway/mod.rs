use crate::domain::payment::{PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod mock;
pub mod yookassa;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider circuit open")]
    CircuitOpen,
    #[error("provider call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected request: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl GatewayError {
    /// Transient errors are worth retrying and count against the circuit
    /// breaker; provider rejections and malformed responses are neither.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub payment_id: Uuid,
    pub order_id: i64,
    pub amount_minor: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub bank_id: Option<String>,
    pub return_url: String,
    pub description: String,
    pub idempotence_key: String,
}

#[derive(Debug, Clone)]
pub struct ProviderPayment {
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub amount_minor: Option<i64>,
    pub confirmation_url: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Outbound calls to the payment provider. Implementations are raw; retry
/// and circuit-breaking are layered on by `resilience::Resilient`.
///
/// `create` must send the payment's stored idempotence key: the provider
/// answers a replayed key with the original payment object, so a retry after
/// a lost response returns the already-created payment instead of charging
/// twice.
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(&self, req: &CreatePayment) -> Result<ProviderPayment, GatewayError>;

    async fn query(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError>;

    async fn cancel(
        &self,
        provider_payment_id: &str,
        idempotence_key: &str,
    ) -> Result<ProviderPayment, GatewayError>;
}

#[async_trait::async_trait]
impl<P: PaymentProvider + ?Sized> PaymentProvider for std::sync::Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn create(&self, req: &CreatePayment) -> Result<ProviderPayment, GatewayError> {
        (**self).create(req).await
    }

    async fn query(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        (**self).query(provider_payment_id).await
    }

    async fn cancel(
        &self,
        provider_payment_id: &str,
        idempotence_key: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        (**self).cancel(provider_payment_id, idempotence_key).await
    }
}
