#![allow(dead_code)]

use payments_core::domain::payment::PaymentMethod;
use payments_core::gateway::mock::MockProvider;
use payments_core::gateway::PaymentProvider;
use payments_core::metrics::PaymentMetrics;
use payments_core::resilience::breaker::{BreakerThresholds, CircuitBreaker};
use payments_core::resilience::retry::RetryPolicy;
use payments_core::resilience::Resilient;
use payments_core::service::applier::{OrderSink, TransitionApplier};
use payments_core::service::notifier::{AdminChannel, NotificationDispatcher};
use payments_core::service::payment_service::{CreatePaymentRequest, PaymentService};
use payments_core::service::webhook::WebhookIngest;
use payments_core::store::memory::InMemoryStore;
use payments_core::domain::payment::Payment;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub struct RecordingChannel {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub fail_first: AtomicU32,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(0),
        }
    }

    pub fn messages(&self) -> Vec<(i64, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl AdminChannel for RecordingChannel {
    async fn send(&self, order_id: i64, message: &str) -> anyhow::Result<()> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("channel down");
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((order_id, message.to_string()));
        Ok(())
    }
}

pub struct RecordingOrderSink {
    pub signals: Mutex<Vec<(i64, String)>>,
}

impl RecordingOrderSink {
    pub fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait::async_trait]
impl OrderSink for RecordingOrderSink {
    async fn payment_terminal(&self, payment: &Payment) -> anyhow::Result<()> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((payment.order_id, payment.status.as_str().to_string()));
        Ok(())
    }
}

pub struct TestEnv {
    pub store: Arc<InMemoryStore>,
    pub mock: Arc<MockProvider>,
    pub metrics: Arc<PaymentMetrics>,
    pub channel: Arc<RecordingChannel>,
    pub orders: Arc<RecordingOrderSink>,
    pub notifier: NotificationDispatcher,
    pub applier: TransitionApplier,
    pub service: PaymentService,
    pub ingest: WebhookIngest,
}

fn build(provider: Arc<dyn PaymentProvider>, mock: Arc<MockProvider>) -> TestEnv {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(PaymentMetrics::new());
    let channel = Arc::new(RecordingChannel::new());
    let orders = Arc::new(RecordingOrderSink::new());
    let notifier =
        NotificationDispatcher::new(channel.clone(), 3, Duration::from_millis(5));
    let applier = TransitionApplier {
        store: store.clone(),
        notifier: notifier.clone(),
        orders: orders.clone(),
        metrics: metrics.clone(),
    };
    let service = PaymentService {
        store: store.clone(),
        provider,
        applier: applier.clone(),
        metrics: metrics.clone(),
        return_url_base: "https://shop.test".to_string(),
    };
    let ingest = WebhookIngest {
        store: store.clone(),
        applier: applier.clone(),
        metrics: metrics.clone(),
    };

    TestEnv {
        store,
        mock,
        metrics,
        channel,
        orders,
        notifier,
        applier,
        service,
        ingest,
    }
}

/// Environment with the provider mock wired in directly (no resilience).
pub fn env() -> TestEnv {
    let mock = Arc::new(MockProvider::new());
    build(mock.clone(), mock)
}

/// Environment with the mock behind the retry + breaker decorator.
pub fn env_resilient(
    thresholds: BreakerThresholds,
    policy: RetryPolicy,
) -> (TestEnv, Arc<CircuitBreaker>) {
    let mock = Arc::new(MockProvider::new());
    let breaker = Arc::new(CircuitBreaker::new(thresholds));
    let provider = Arc::new(Resilient::new(mock.clone(), breaker.clone(), policy));
    (build(provider, mock), breaker)
}

pub fn create_req(order_id: i64) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id,
        amount_minor: 50_000,
        method: PaymentMethod::Sbp,
        currency: None,
        bank_id: Some("sberbank".to_string()),
        return_url: None,
        description: None,
    }
}

/// Lets spawned notification tasks drain before counting messages.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
