use std::sync::Arc;

pub mod config;
pub mod domain {
    pub mod payment;
}
pub mod gateway;
pub mod http {
    pub mod handlers {
        pub mod metrics;
        pub mod ops;
        pub mod payments;
        pub mod webhook;
    }
}
pub mod metrics;
pub mod resilience;
pub mod service {
    pub mod applier;
    pub mod maintenance;
    pub mod notifier;
    pub mod payment_service;
    pub mod poller;
    pub mod webhook;
}
pub mod store;

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub webhook_ingest: service::webhook::WebhookIngest,
    pub metrics: Arc<metrics::PaymentMetrics>,
    pub pool: sqlx::PgPool,
}
