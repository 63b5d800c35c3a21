use crate::gateway::{CreatePayment, GatewayError, PaymentProvider, ProviderPayment};
use std::future::Future;
use std::sync::Arc;

pub mod breaker;
pub mod retry;

use breaker::{CallDecision, CircuitBreaker};
use retry::{backoff_delay, RetryPolicy};

/// Decorator adding bounded retry with backoff and a shared circuit breaker
/// to any `PaymentProvider`. Transient errors are retried and recorded as
/// breaker failures; provider rejections pass straight through. On
/// exhaustion the caller gets a typed `RetriesExhausted`, never a raw
/// transport error.
pub struct Resilient<P> {
    inner: P,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl<P> Resilient<P> {
    pub fn new(inner: P, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            breaker,
            retry,
        }
    }
}

impl<P: PaymentProvider> Resilient<P> {
    async fn call<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let was_probe = match self.breaker.pre_call() {
                CallDecision::Allow => false,
                CallDecision::Probe => true,
                CallDecision::Reject => return Err(GatewayError::CircuitOpen),
            };

            match op().await {
                Ok(value) => {
                    self.breaker.record(false, was_probe);
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    self.breaker.record(true, was_probe);
                    if attempt >= self.retry.max_attempts {
                        return Err(GatewayError::RetriesExhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    tracing::warn!(
                        "provider {op_name} attempt {attempt} failed ({e}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record(false, was_probe);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<P: PaymentProvider> PaymentProvider for Resilient<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn create(&self, req: &CreatePayment) -> Result<ProviderPayment, GatewayError> {
        self.call("create", || self.inner.create(req)).await
    }

    async fn query(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        self.call("query", || self.inner.query(provider_payment_id))
            .await
    }

    async fn cancel(
        &self,
        provider_payment_id: &str,
        idempotence_key: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        self.call("cancel", || {
            self.inner.cancel(provider_payment_id, idempotence_key)
        })
        .await
    }
}
