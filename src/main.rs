use axum::routing::{get, post};
use axum::Router;
use payments_core::config::AppConfig;
use payments_core::gateway::yookassa::YooKassaClient;
use payments_core::metrics::PaymentMetrics;
use payments_core::resilience::breaker::{BreakerThresholds, CircuitBreaker};
use payments_core::resilience::retry::RetryPolicy;
use payments_core::resilience::Resilient;
use payments_core::service::applier::{LoggingOrderSink, TransitionApplier};
use payments_core::service::maintenance::MaintenanceLoop;
use payments_core::service::notifier::{LoggingAdminChannel, NotificationDispatcher};
use payments_core::service::payment_service::PaymentService;
use payments_core::service::poller::PaymentPoller;
use payments_core::service::webhook::WebhookIngest;
use payments_core::store::postgres::PgPaymentStore;
use payments_core::store::PaymentStore;
use payments_core::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore { pool: pool.clone() });
    let metrics = Arc::new(PaymentMetrics::new());

    // One breaker for the whole process: webhook-path and poller failures
    // land in the same window.
    let breaker = Arc::new(CircuitBreaker::new(BreakerThresholds::default()));
    let provider = Arc::new(Resilient::new(
        YooKassaClient {
            base_url: cfg.provider_base_url.clone(),
            shop_id: cfg.provider_shop_id.clone(),
            secret_key: cfg.provider_secret_key.clone(),
            timeout_ms: cfg.provider_timeout_ms,
            client: reqwest::Client::new(),
        },
        breaker,
        RetryPolicy {
            max_attempts: cfg.retry_max_attempts,
            base_delay_ms: cfg.retry_base_delay_ms,
            ..RetryPolicy::default()
        },
    ));

    let notifier = NotificationDispatcher::new(
        Arc::new(LoggingAdminChannel),
        cfg.notify_max_attempts,
        Duration::from_secs(2),
    );
    let applier = TransitionApplier {
        store: store.clone(),
        notifier: notifier.clone(),
        orders: Arc::new(LoggingOrderSink),
        metrics: metrics.clone(),
    };

    let payment_service = PaymentService {
        store: store.clone(),
        provider,
        applier: applier.clone(),
        metrics: metrics.clone(),
        return_url_base: cfg.return_url_base.clone(),
    };
    let webhook_ingest = WebhookIngest {
        store: store.clone(),
        applier,
        metrics: metrics.clone(),
    };

    let poller = PaymentPoller {
        store: store.clone(),
        service: payment_service.clone(),
        interval: Duration::from_secs(cfg.poll_interval_secs),
        lookback: chrono::Duration::minutes(cfg.poll_lookback_minutes),
        batch_size: cfg.poll_batch_size,
    }
    .spawn();

    let maintenance = MaintenanceLoop {
        store: store.clone(),
        notifier,
        interval: Duration::from_secs(cfg.maintenance_interval_secs),
        stale_after: chrono::Duration::minutes(cfg.poll_lookback_minutes),
        retention: chrono::Duration::days(cfg.retention_days),
        batch_size: cfg.poll_batch_size,
    }
    .spawn();

    let state = AppState {
        payment_service,
        webhook_ingest,
        metrics,
        pool,
    };

    let app = Router::new()
        .route("/health", get(payments_core::http::handlers::ops::health))
        .route("/ops/readiness", get(payments_core::http::handlers::ops::readiness))
        .route("/ops/liveness", get(payments_core::http::handlers::ops::liveness))
        .route("/payments", post(payments_core::http::handlers::payments::create_payment))
        .route(
            "/payments/:payment_id",
            get(payments_core::http::handlers::payments::get_payment),
        )
        .route(
            "/payments/:payment_id/check-status",
            post(payments_core::http::handlers::payments::check_status),
        )
        .route(
            "/payments/:payment_id/cancel",
            post(payments_core::http::handlers::payments::cancel_payment),
        )
        .route(
            "/payments/order/:order_id",
            get(payments_core::http::handlers::payments::list_order_payments),
        )
        .route(
            "/payments/sbp/banks",
            get(payments_core::http::handlers::payments::list_sbp_banks),
        )
        .route(
            "/webhooks/yookassa",
            post(payments_core::http::handlers::webhook::provider_webhook),
        )
        .route(
            "/metrics/payments",
            get(payments_core::http::handlers::metrics::payment_metrics),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    poller.stop().await;
    maintenance.stop().await;
    Ok(())
}
