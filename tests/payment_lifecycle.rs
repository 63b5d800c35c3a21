mod support;

use payments_core::domain::payment::{PaymentMethod, PaymentStatus};
use payments_core::gateway::mock::MockProvider;
use payments_core::metrics::Counter;
use payments_core::service::applier::TransitionSource;
use payments_core::service::payment_service::PaymentError;
use payments_core::store::PaymentStore;
use support::{create_req, env, settle};

#[tokio::test]
async fn create_records_provider_details_and_counters() {
    let env = env();

    let resp = env.service.create_payment(create_req(40)).await.unwrap();
    assert_eq!(resp.status, PaymentStatus::Pending);
    assert!(resp.provider_payment_id.is_some());
    assert!(resp
        .confirmation_url
        .as_deref()
        .unwrap()
        .starts_with("https://mock.pay/confirm/"));
    assert_eq!(resp.currency, "RUB");

    assert_eq!(env.metrics.count(Counter::PaymentsCreated), 1);
    let summary = env.metrics.summary();
    assert_eq!(summary.avg_amount_minor, 50_000);
    assert_eq!(summary.creation_latency.count, 1);
}

#[tokio::test]
async fn create_rejects_bad_amount_and_cash() {
    let env = env();

    let mut bad_amount = create_req(41);
    bad_amount.amount_minor = 0;
    assert!(matches!(
        env.service.create_payment(bad_amount).await,
        Err(PaymentError::Invalid(_))
    ));

    let mut cash = create_req(41);
    cash.method = PaymentMethod::Cash;
    assert!(matches!(
        env.service.create_payment(cash).await,
        Err(PaymentError::Invalid(_))
    ));

    assert!(env.store.list_for_order(41).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_refuses_an_already_paid_order() {
    let env = env();
    let first = env.service.create_payment(create_req(42)).await.unwrap();
    let payment = env.store.find(first.id).await.unwrap().unwrap();
    env.applier
        .apply(&payment, PaymentStatus::Succeeded, TransitionSource::Webhook, None)
        .await
        .unwrap();

    assert!(matches!(
        env.service.create_payment(create_req(42)).await,
        Err(PaymentError::AlreadyPaid(42))
    ));
}

#[tokio::test]
async fn second_payment_allowed_while_first_still_pending() {
    let env = env();
    env.service.create_payment(create_req(43)).await.unwrap();
    env.service.create_payment(create_req(43)).await.unwrap();

    assert_eq!(env.store.list_for_order(43).await.unwrap().len(), 2);
}

#[tokio::test]
async fn provider_id_is_written_exactly_once() {
    let env = env();
    let created = env.service.create_payment(create_req(44)).await.unwrap();
    let original_id = created.provider_payment_id.clone().unwrap();

    // a replayed creation result must not overwrite the recorded id
    let after = env
        .store
        .record_provider_details(created.id, "other-provider-id", Some("https://elsewhere"))
        .await
        .unwrap();
    assert_eq!(after.provider_payment_id.as_deref(), Some(original_id.as_str()));
}

#[tokio::test]
async fn user_cancel_goes_through_gateway_then_applier() {
    let env = env();
    let created = env.service.create_payment(create_req(45)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();
    env.mock.push_cancel(Ok(MockProvider::with_status(
        &provider_id,
        PaymentStatus::Cancelled,
    )));

    let resp = env.service.cancel_payment(created.id).await.unwrap();
    assert_eq!(resp.status, PaymentStatus::Cancelled);
    assert_eq!(resp.error_message.as_deref(), Some("cancelled by user"));
    assert_eq!(
        env.mock
            .cancel_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    settle().await;
    assert_eq!(env.channel.messages().len(), 1);
    assert_eq!(env.metrics.count(Counter::PaymentsCancelled), 1);
}

#[tokio::test]
async fn cancel_rejected_once_terminal() {
    let env = env();
    let created = env.service.create_payment(create_req(46)).await.unwrap();
    let payment = env.store.find(created.id).await.unwrap().unwrap();
    env.applier
        .apply(&payment, PaymentStatus::Succeeded, TransitionSource::Webhook, None)
        .await
        .unwrap();

    assert!(matches!(
        env.service.cancel_payment(created.id).await,
        Err(PaymentError::NotCancellable(PaymentStatus::Succeeded))
    ));
}

#[tokio::test]
async fn manual_check_status_reconciles_like_the_poller() {
    let env = env();
    let created = env.service.create_payment(create_req(47)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();
    env.mock.push_query(Ok(MockProvider::with_status(
        &provider_id,
        PaymentStatus::Succeeded,
    )));

    let resp = env.service.check_status(created.id).await.unwrap();
    assert_eq!(resp.status, PaymentStatus::Succeeded);
    assert!(resp.paid_at.is_some());

    // terminal payments are answered from the store, no provider call
    let calls = env.mock.query_calls.load(std::sync::atomic::Ordering::SeqCst);
    env.service.check_status(created.id).await.unwrap();
    assert_eq!(
        env.mock.query_calls.load(std::sync::atomic::Ordering::SeqCst),
        calls
    );
}

#[tokio::test]
async fn status_history_is_monotonic_under_mixed_channels() {
    let env = env();
    let created = env.service.create_payment(create_req(48)).await.unwrap();
    let provider_id = created.provider_payment_id.clone().unwrap();

    // poll sees waiting_for_capture, webhook then finishes the payment,
    // a late poll result reports an older state and must be rejected
    env.mock.push_query(Ok(MockProvider::with_status(
        &provider_id,
        PaymentStatus::WaitingForCapture,
    )));
    env.service.check_status(created.id).await.unwrap();

    let payment = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::WaitingForCapture);

    env.applier
        .apply(&payment, PaymentStatus::Succeeded, TransitionSource::Webhook, None)
        .await
        .unwrap();

    let stale = env.store.find(created.id).await.unwrap().unwrap();
    let outcome = env
        .applier
        .apply(
            &stale,
            PaymentStatus::WaitingForCapture,
            TransitionSource::Poll,
            None,
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        payments_core::service::applier::ApplyOutcome::Rejected
    ));

    let current = env.store.find(created.id).await.unwrap().unwrap();
    assert_eq!(current.status, PaymentStatus::Succeeded);
}
