mod support;

use payments_core::domain::payment::PaymentStatus;
use payments_core::metrics::Counter;
use payments_core::service::webhook::{
    CancellationDetails, WebhookAmount, WebhookDisposition, WebhookEvent, WebhookObject,
};
use payments_core::store::PaymentStore;
use support::{create_req, env, settle};

fn event(event_type: &str, provider_id: &str, status: Option<&str>) -> WebhookEvent {
    WebhookEvent {
        event: event_type.to_string(),
        object: WebhookObject {
            id: provider_id.to_string(),
            status: status.map(ToString::to_string),
            amount: Some(WebhookAmount {
                value: "500.00".to_string(),
                currency: Some("RUB".to_string()),
            }),
            cancellation_details: None,
        },
    }
}

#[tokio::test]
async fn succeeded_webhook_finalizes_payment() {
    let env = env();
    let created = env.service.create_payment(create_req(10)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    let disposition = env
        .ingest
        .process(event("payment.succeeded", &provider_id, Some("succeeded")))
        .await
        .unwrap();
    assert_eq!(disposition, WebhookDisposition::Applied);

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert!(payment.paid_at.is_some());

    settle().await;
    let messages = env.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("paid"));
    assert!(messages[0].1.contains("SBP"));
    assert_eq!(env.metrics.count(Counter::PaymentsSucceeded), 1);
    assert_eq!(env.metrics.count(Counter::WebhooksReceived), 1);
    assert_eq!(env.metrics.count(Counter::WebhooksProcessed), 1);
}

#[tokio::test]
async fn duplicate_terminal_webhook_changes_nothing() {
    let env = env();
    let created = env.service.create_payment(create_req(11)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    let first = event("payment.succeeded", &provider_id, Some("succeeded"));
    env.ingest.process(first.clone()).await.unwrap();
    let after_first = env.store.find(created.id).await.unwrap().unwrap();

    // at-least-once delivery: the provider sends the same event again
    let disposition = env.ingest.process(first).await.unwrap();
    assert_eq!(disposition, WebhookDisposition::Applied);

    let after_second = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(after_second.status, PaymentStatus::Succeeded);
    assert_eq!(after_second.paid_at, after_first.paid_at);
    assert_eq!(after_second.updated_at, after_first.updated_at);

    settle().await;
    assert_eq!(env.channel.messages().len(), 1);
    assert_eq!(env.metrics.count(Counter::PaymentsSucceeded), 1);
}

#[tokio::test]
async fn unknown_provider_payment_is_acknowledged_untouched() {
    let env = env();
    let created = env.service.create_payment(create_req(12)).await.unwrap();

    let disposition = env
        .ingest
        .process(event("payment.succeeded", "xyz", Some("succeeded")))
        .await
        .unwrap();
    assert_eq!(disposition, WebhookDisposition::UnknownPayment);

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    settle().await;
    assert!(env.channel.messages().is_empty());
}

#[tokio::test]
async fn irrelevant_event_type_is_ignored() {
    let env = env();
    let created = env.service.create_payment(create_req(13)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    let disposition = env
        .ingest
        .process(event("refund.succeeded", &provider_id, Some("succeeded")))
        .await
        .unwrap();
    assert_eq!(disposition, WebhookDisposition::Ignored);

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn waiting_for_capture_event_moves_payment_forward() {
    let env = env();
    let created = env.service.create_payment(create_req(14)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    env.ingest
        .process(event(
            "payment.waiting_for_capture",
            &provider_id,
            Some("waiting_for_capture"),
        ))
        .await
        .unwrap();

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::WaitingForCapture);

    settle().await;
    // non-terminal: no notification
    assert!(env.channel.messages().is_empty());
}

#[tokio::test]
async fn cancelled_webhook_records_the_reason() {
    let env = env();
    let created = env.service.create_payment(create_req(15)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    let mut cancelled = event("payment.canceled", &provider_id, Some("canceled"));
    cancelled.object.cancellation_details = Some(CancellationDetails {
        party: Some("yoo_money".to_string()),
        reason: Some("expired_on_confirmation".to_string()),
    });

    env.ingest.process(cancelled).await.unwrap();

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Cancelled);
    assert_eq!(
        payment.error_message.as_deref(),
        Some("expired_on_confirmation")
    );

    settle().await;
    let messages = env.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("cancelled"));
    assert_eq!(env.metrics.count(Counter::PaymentsCancelled), 1);
}

#[tokio::test]
async fn missing_object_status_falls_back_to_event_type() {
    let env = env();
    let created = env.service.create_payment(create_req(16)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    env.ingest
        .process(event("payment.succeeded", &provider_id, None))
        .await
        .unwrap();

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
}
