use crate::domain::payment::PaymentStatus;
use crate::gateway::{CreatePayment, GatewayError, PaymentProvider, ProviderPayment};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Scriptable stand-in for the real provider. Results pushed with the
/// `push_*` helpers are returned in order; once a queue runs dry the mock
/// falls back to a pending payment so unscripted calls still succeed.
#[derive(Default)]
pub struct MockProvider {
    create_results: Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
    query_results: Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
    cancel_results: Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
    pub create_calls: AtomicU32,
    pub query_calls: AtomicU32,
    pub cancel_calls: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(provider_payment_id: &str) -> ProviderPayment {
        ProviderPayment {
            provider_payment_id: provider_payment_id.to_string(),
            status: PaymentStatus::Pending,
            amount_minor: None,
            confirmation_url: Some(format!("https://mock.pay/confirm/{provider_payment_id}")),
            captured_at: None,
            error_message: None,
        }
    }

    pub fn with_status(provider_payment_id: &str, status: PaymentStatus) -> ProviderPayment {
        ProviderPayment {
            status,
            ..Self::pending(provider_payment_id)
        }
    }

    pub fn push_create(&self, result: Result<ProviderPayment, GatewayError>) {
        lock(&self.create_results).push_back(result);
    }

    pub fn push_query(&self, result: Result<ProviderPayment, GatewayError>) {
        lock(&self.query_results).push_back(result);
    }

    pub fn push_cancel(&self, result: Result<ProviderPayment, GatewayError>) {
        lock(&self.cancel_results).push_back(result);
    }

    fn pop(
        queue: &Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
        calls: &AtomicU32,
        fallback_id: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        calls.fetch_add(1, Ordering::SeqCst);
        lock(queue)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::pending(fallback_id)))
    }
}

fn lock<'a>(
    m: &'a Mutex<VecDeque<Result<ProviderPayment, GatewayError>>>,
) -> std::sync::MutexGuard<'a, VecDeque<Result<ProviderPayment, GatewayError>>> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, req: &CreatePayment) -> Result<ProviderPayment, GatewayError> {
        let fallback = format!("mock-{}", req.payment_id.simple());
        Self::pop(&self.create_results, &self.create_calls, &fallback)
    }

    async fn query(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        Self::pop(&self.query_results, &self.query_calls, provider_payment_id)
    }

    async fn cancel(
        &self,
        provider_payment_id: &str,
        _idempotence_key: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        Self::pop(&self.cancel_results, &self.cancel_calls, provider_payment_id)
    }
}
