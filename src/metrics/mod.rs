use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PaymentsCreated,
    PaymentsSucceeded,
    PaymentsFailed,
    PaymentsCancelled,
    WebhooksReceived,
    WebhooksProcessed,
    WebhooksFailed,
    TransitionsRejected,
}

/// Increment/record primitives produced by the engine. The in-process
/// registry below is the default sink; a deployment can point this at any
/// external collector.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, counter: Counter);
    fn record_creation_latency(&self, ms: u64);
    fn record_webhook_latency(&self, ms: u64);
    fn record_amount(&self, amount_minor: i64);
}

#[derive(Default)]
struct MetricsInner {
    counters: HashMap<Counter, u64>,
    creation_latencies_ms: Vec<u64>,
    webhook_latencies_ms: Vec<u64>,
    amount_total_minor: i64,
    amount_samples: u64,
}

#[derive(Default)]
pub struct PaymentMetrics {
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub avg_ms: u64,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub payments_created: u64,
    pub payments_succeeded: u64,
    pub payments_failed: u64,
    pub payments_cancelled: u64,
    pub webhooks_received: u64,
    pub webhooks_processed: u64,
    pub webhooks_failed: u64,
    pub transitions_rejected: u64,
    /// Succeeded / created; derived on read, never stored.
    pub conversion_rate: f64,
    pub avg_amount_minor: i64,
    pub creation_latency: LatencySummary,
    pub webhook_latency: LatencySummary,
}

impl PaymentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self, counter: Counter) -> u64 {
        self.lock().counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> MetricsSummary {
        let inner = self.lock();
        let get = |c: Counter| inner.counters.get(&c).copied().unwrap_or(0);

        let created = get(Counter::PaymentsCreated);
        let succeeded = get(Counter::PaymentsSucceeded);
        let conversion_rate = if created == 0 {
            0.0
        } else {
            succeeded as f64 / created as f64
        };
        let avg_amount_minor = if inner.amount_samples == 0 {
            0
        } else {
            inner.amount_total_minor / inner.amount_samples as i64
        };

        MetricsSummary {
            payments_created: created,
            payments_succeeded: succeeded,
            payments_failed: get(Counter::PaymentsFailed),
            payments_cancelled: get(Counter::PaymentsCancelled),
            webhooks_received: get(Counter::WebhooksReceived),
            webhooks_processed: get(Counter::WebhooksProcessed),
            webhooks_failed: get(Counter::WebhooksFailed),
            transitions_rejected: get(Counter::TransitionsRejected),
            conversion_rate,
            avg_amount_minor,
            creation_latency: summarize(&inner.creation_latencies_ms),
            webhook_latency: summarize(&inner.webhook_latencies_ms),
        }
    }
}

impl MetricsSink for PaymentMetrics {
    fn increment(&self, counter: Counter) {
        *self.lock().counters.entry(counter).or_insert(0) += 1;
    }

    fn record_creation_latency(&self, ms: u64) {
        self.lock().creation_latencies_ms.push(ms);
    }

    fn record_webhook_latency(&self, ms: u64) {
        self.lock().webhook_latencies_ms.push(ms);
    }

    fn record_amount(&self, amount_minor: i64) {
        let mut inner = self.lock();
        inner.amount_total_minor += amount_minor;
        inner.amount_samples += 1;
    }
}

fn summarize(samples: &[u64]) -> LatencySummary {
    if samples.is_empty() {
        return LatencySummary {
            count: 0,
            avg_ms: 0,
            p95_ms: 0,
        };
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let sum: u64 = sorted.iter().sum();
    LatencySummary {
        count: sorted.len() as u64,
        avg_ms: sum / sorted.len() as u64,
        p95_ms: percentile(&sorted, 0.95),
    }
}

pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx]
}
