use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::gateway::{CreatePayment, GatewayError, PaymentProvider};
use crate::metrics::{Counter, MetricsSink};
use crate::service::applier::{ApplyOutcome, TransitionApplier, TransitionSource};
use crate::store::{NewPayment, PaymentStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment {0} not found")]
    NotFound(Uuid),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("order {0} is already paid")]
    AlreadyPaid(i64),
    #[error("payment cannot be cancelled in status {0}")]
    NotCancellable(PaymentStatus),
    #[error("payment was never submitted to the provider")]
    NotSubmitted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: i64,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    pub currency: Option<String>,
    pub bank_id: Option<String>,
    pub return_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub provider_payment_id: Option<String>,
    pub order_id: i64,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub amount_minor: i64,
    pub currency: String,
    pub bank_id: Option<String>,
    pub confirmation_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            provider_payment_id: p.provider_payment_id,
            order_id: p.order_id,
            status: p.status,
            method: p.method,
            amount_minor: p.amount_minor,
            currency: p.currency,
            bank_id: p.bank_id,
            confirmation_url: p.confirmation_url,
            error_message: p.error_message,
            created_at: p.created_at,
            paid_at: p.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SbpBank {
    pub id: &'static str,
    pub name: &'static str,
    pub logo_url: &'static str,
}

pub fn sbp_banks() -> Vec<SbpBank> {
    vec![
        SbpBank { id: "sberbank", name: "Sberbank", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/sber.svg" },
        SbpBank { id: "tinkoff", name: "Tinkoff", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/tcs.svg" },
        SbpBank { id: "vtb", name: "VTB", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/vtb.svg" },
        SbpBank { id: "alfabank", name: "Alfa-Bank", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/alfabank.svg" },
        SbpBank { id: "raiffeisen", name: "Raiffeisen", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/raiffeisen.svg" },
        SbpBank { id: "gazprombank", name: "Gazprombank", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/gazprom.svg" },
        SbpBank { id: "rosbank", name: "Rosbank", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/rosbank.svg" },
        SbpBank { id: "mkb", name: "MKB", logo_url: "https://static.yoomoney.ru/files-front/banks-logos/mkb.svg" },
    ]
}

#[derive(Clone)]
pub struct PaymentService {
    pub store: Arc<dyn PaymentStore>,
    pub provider: Arc<dyn PaymentProvider>,
    pub applier: TransitionApplier,
    pub metrics: Arc<dyn MetricsSink>,
    pub return_url_base: String,
}

impl PaymentService {
    pub async fn create_payment(
        &self,
        req: CreatePaymentRequest,
    ) -> Result<PaymentResponse, PaymentError> {
        if req.amount_minor <= 0 {
            return Err(PaymentError::Invalid(
                "amount_minor must be positive".to_string(),
            ));
        }
        if !req.method.is_online() {
            return Err(PaymentError::Invalid(
                "cash orders settle offline and are not submitted to the gateway".to_string(),
            ));
        }
        if self.store.order_has_succeeded_payment(req.order_id).await? {
            return Err(PaymentError::AlreadyPaid(req.order_id));
        }

        let payment_id = Uuid::new_v4();
        let idempotence_key = format!("pay_{}", Uuid::new_v4().simple());
        let currency = req.currency.clone().unwrap_or_else(|| "RUB".to_string());

        let payment = self
            .store
            .insert(NewPayment {
                id: payment_id,
                order_id: req.order_id,
                method: req.method,
                amount_minor: req.amount_minor,
                currency: currency.clone(),
                bank_id: req.bank_id.clone(),
                idempotence_key: idempotence_key.clone(),
            })
            .await?;

        self.metrics.increment(Counter::PaymentsCreated);
        self.metrics.record_amount(req.amount_minor);
        tracing::info!(
            "payment {} created for order {} ({} {} via {})",
            payment.id,
            payment.order_id,
            req.amount_minor,
            currency,
            req.method
        );

        let create_req = CreatePayment {
            payment_id,
            order_id: req.order_id,
            amount_minor: req.amount_minor,
            currency,
            method: req.method,
            bank_id: req.bank_id,
            return_url: req
                .return_url
                .unwrap_or_else(|| format!("{}/orders/{}", self.return_url_base, req.order_id)),
            description: req
                .description
                .unwrap_or_else(|| format!("payment for order #{}", req.order_id)),
            idempotence_key,
        };

        let started = Instant::now();
        let created = self.provider.create(&create_req).await;
        self.metrics
            .record_creation_latency(started.elapsed().as_millis() as u64);

        match created {
            Ok(provider_payment) => {
                let payment = self
                    .store
                    .record_provider_details(
                        payment.id,
                        &provider_payment.provider_payment_id,
                        provider_payment.confirmation_url.as_deref(),
                    )
                    .await?;

                let payment = if provider_payment.status != payment.status {
                    match self
                        .applier
                        .apply(
                            &payment,
                            provider_payment.status,
                            TransitionSource::Create,
                            provider_payment.error_message,
                        )
                        .await?
                    {
                        ApplyOutcome::Committed(p) => p,
                        _ => payment,
                    }
                } else {
                    payment
                };

                Ok(PaymentResponse::from(payment))
            }
            Err(e) => {
                // The order stays payable; the row must not linger as PENDING
                // pretending a provider call is still in flight.
                if let Err(store_err) = self
                    .applier
                    .apply(
                        &payment,
                        PaymentStatus::Failed,
                        TransitionSource::Create,
                        Some(e.to_string()),
                    )
                    .await
                {
                    tracing::error!(
                        "failed to mark payment {} as failed: {store_err}",
                        payment.id
                    );
                }
                Err(PaymentError::Gateway(e))
            }
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<PaymentResponse, PaymentError> {
        let payment = self
            .store
            .find(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;
        Ok(PaymentResponse::from(payment))
    }

    pub async fn list_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<PaymentResponse>, PaymentError> {
        let payments = self.store.list_for_order(order_id).await?;
        Ok(payments.into_iter().map(PaymentResponse::from).collect())
    }

    /// Re-queries the provider and reconciles the local record. Used by the
    /// active poller and by the manual check-status endpoint.
    pub async fn check_status(&self, id: Uuid) -> Result<PaymentResponse, PaymentError> {
        let payment = self
            .store
            .find(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if payment.status.is_terminal() {
            return Ok(PaymentResponse::from(payment));
        }
        let provider_payment_id = payment
            .provider_payment_id
            .clone()
            .ok_or(PaymentError::NotSubmitted)?;

        let provider_payment = self.provider.query(&provider_payment_id).await?;
        if provider_payment.status == payment.status {
            return Ok(PaymentResponse::from(payment));
        }

        match self
            .applier
            .apply(
                &payment,
                provider_payment.status,
                TransitionSource::Poll,
                provider_payment.error_message,
            )
            .await?
        {
            ApplyOutcome::Committed(p) => Ok(PaymentResponse::from(p)),
            _ => {
                let current = self
                    .store
                    .find(id)
                    .await?
                    .ok_or(PaymentError::NotFound(id))?;
                Ok(PaymentResponse::from(current))
            }
        }
    }

    pub async fn cancel_payment(&self, id: Uuid) -> Result<PaymentResponse, PaymentError> {
        let payment = self
            .store
            .find(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if !payment.status.is_cancellable() {
            return Err(PaymentError::NotCancellable(payment.status));
        }
        let provider_payment_id = payment
            .provider_payment_id
            .clone()
            .ok_or(PaymentError::NotSubmitted)?;

        let cancel_key = format!("cancel_{}", Uuid::new_v4().simple());
        let provider_payment = self
            .provider
            .cancel(&provider_payment_id, &cancel_key)
            .await?;

        match self
            .applier
            .apply(
                &payment,
                PaymentStatus::Cancelled,
                TransitionSource::UserCancel,
                provider_payment
                    .error_message
                    .or_else(|| Some("cancelled by user".to_string())),
            )
            .await?
        {
            ApplyOutcome::Committed(p) => Ok(PaymentResponse::from(p)),
            _ => {
                let current = self
                    .store
                    .find(id)
                    .await?
                    .ok_or(PaymentError::NotFound(id))?;
                Ok(PaymentResponse::from(current))
            }
        }
    }
}
