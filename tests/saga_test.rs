mod common;

use common::*;
use payorch::domain::gateway::Provider;
use payorch::domain::order::PaymentMethodKind;
use payorch::domain::status::{PaymentStatus, StatusDetail};
use payorch::error::PaymentError;
use payorch::providers::ProviderOperation;
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_unavailable_gateway_falls_back_to_next() {
    let h = harness();
    h.client
        .push(Provider::Cybersource, ProviderOperation::Create, 503, json!({ "message": "down" }))
        .await;
    h.client
        .push(
            Provider::MercadoPago,
            ProviderOperation::Create,
            201,
            mp_card("approved", "accredited", 11),
        )
        .await;

    let order = processed(&h, new_order("o-100", PaymentMethodKind::CreditCard, vec![card(dec!(80), "tok_ok")])).await;
    assert_eq!(order.status, PaymentStatus::Successful);

    let payments = h.engine.payments(order.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0].client_reference.to_string(), format!("{}_1", order.id));
    assert_eq!(payments[0].status, PaymentStatus::Error);
    assert_eq!(payments[0].status_detail, StatusDetail::GatewayUnavailable);
    assert_eq!(payments[0].retried_with_payment_id, Some(payments[1].id));
    assert_eq!(payments[1].client_reference.to_string(), format!("{}_2", order.id));
    assert_eq!(payments[1].gateway_method_id, MERCADO_PAGO_CARD);

    let notified = h.notifier.notified().await;
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].status, PaymentStatus::Successful);
}

#[tokio::test]
async fn test_last_unavailable_gateway_ends_in_error() {
    let h = harness();
    h.client
        .push(Provider::Cybersource, ProviderOperation::Create, 503, json!({}))
        .await;
    h.client
        .push(Provider::MercadoPago, ProviderOperation::Create, 503, json!({}))
        .await;

    let order = processed(&h, new_order("o-101", PaymentMethodKind::CreditCard, vec![card(dec!(80), "tok_ok")])).await;

    assert_eq!(order.status, PaymentStatus::Error);
    let payments = h.engine.payments(order.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments[1].is_valid());
    assert_eq!(payments[1].status_detail, StatusDetail::GatewayUnavailable);
}

#[tokio::test]
async fn test_hard_failure_restores_previous_attempt() {
    let h = harness();
    h.client
        .push(Provider::Cybersource, ProviderOperation::Create, 503, json!({}))
        .await;
    h.client
        .push(Provider::MercadoPago, ProviderOperation::Create, 400, json!({ "message": "bad_request" }))
        .await;

    let created = h
        .engine
        .create_payment_order(new_order("o-102", PaymentMethodKind::CreditCard, vec![card(dec!(80), "tok_ok")]))
        .await
        .unwrap();
    let result = h.engine.process_payment_order(created.id).await;
    assert!(matches!(
        result,
        Err(PaymentError::FailResponse {
            provider: Provider::MercadoPago,
            status_code: 400,
            ..
        })
    ));

    let payments = h.engine.payments(created.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments[0].is_valid());
    assert_eq!(payments[1].retried_with_payment_id, Some(payments[0].id));
    assert_eq!(payments[1].status, PaymentStatus::Error);
}

#[tokio::test]
async fn test_provider_timeout_marks_payment_error() {
    let h = harness_with(settings(), ScriptedClient::with_delay(Duration::from_millis(500)));

    let created = h
        .engine
        .create_payment_order(new_order("o-103", PaymentMethodKind::Ticket, vec![ticket(dec!(30))]))
        .await
        .unwrap();
    let result = h.engine.process_payment_order(created.id).await;
    assert!(matches!(
        result,
        Err(PaymentError::RequestError {
            provider: Provider::Bradesco,
            ..
        })
    ));

    let payments = h.engine.payments(created.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Error);
    assert_eq!(payments[0].status_detail, StatusDetail::GatewayUnavailable);
}

#[tokio::test]
async fn test_interest_must_match_installment_plan() {
    let h = harness();
    let mut instrument = card(dec!(100), "tok_ok");
    instrument.installments = 3;
    instrument.interest = dec!(5.00);

    let created = h
        .engine
        .create_payment_order(new_order("o-104", PaymentMethodKind::CreditCard, vec![instrument]))
        .await
        .unwrap();
    let result = h.engine.process_payment_order(created.id).await;
    assert!(matches!(
        result,
        Err(PaymentError::InterestMismatch { expected, .. }) if expected == dec!(3.99)
    ));
    assert!(h.engine.payments(created.id).await.unwrap().is_empty());
    assert!(h.client.requests().await.is_empty());
}

#[tokio::test]
async fn test_second_card_is_rejected_without_provider_call() {
    let h = harness();
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Create,
            201,
            json!({ "id": "c-1", "status": "DECLINED", "errorInformation": { "reason": "INSUFFICIENT_FUND" } }),
        )
        .await;

    let order = processed(
        &h,
        new_order(
            "o-105",
            PaymentMethodKind::TwoCreditCards,
            vec![card(dec!(60), "tok_a"), card(dec!(40), "tok_b")],
        ),
    )
    .await;

    assert_eq!(order.status, PaymentStatus::Rejected);
    let payments = h.engine.payments(order.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0].status_detail, StatusDetail::InsufficientFunds);
    assert_eq!(payments[1].status, PaymentStatus::Rejected);
    assert_eq!(payments[1].status_detail, StatusDetail::OtherInstrumentRejected);
    assert_eq!(payments[1].client_reference.to_string(), format!("{}-2_1", order.id));
    assert_eq!(h.client.count(Provider::Cybersource, ProviderOperation::Create).await, 1);
}

#[tokio::test]
async fn test_failed_dual_order_releases_held_funds() {
    let h = harness();
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Create,
            201,
            json!({ "id": "c-1", "status": "AUTHORIZED" }),
        )
        .await;
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Create,
            201,
            json!({ "id": "c-2", "status": "DECLINED", "errorInformation": { "reason": "EXPIRED_CARD" } }),
        )
        .await;
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Void,
            201,
            json!({ "id": "c-1", "status": "REVERSED" }),
        )
        .await;

    let order = processed(
        &h,
        new_order(
            "o-106",
            PaymentMethodKind::TwoCreditCards,
            vec![card(dec!(60), "tok_a"), card(dec!(40), "tok_b")],
        ),
    )
    .await;

    assert_eq!(order.status, PaymentStatus::Rejected);
    let payments = h.engine.payments(order.id).await.unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Cancelled);
    assert_eq!(payments[1].status, PaymentStatus::Rejected);
    assert_eq!(h.client.count(Provider::Cybersource, ProviderOperation::Void).await, 1);
}

#[tokio::test]
async fn test_dual_order_waits_for_slowest_payment() {
    let h = harness();
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Create,
            201,
            json!({ "id": "c-1", "status": "AUTHORIZED" }),
        )
        .await;
    h.client
        .push(
            Provider::Cybersource,
            ProviderOperation::Create,
            201,
            json!({ "id": "c-2", "status": "AUTHORIZED_PENDING_REVIEW" }),
        )
        .await;

    let order = processed(
        &h,
        new_order(
            "o-107",
            PaymentMethodKind::TwoCreditCards,
            vec![card(dec!(50), "tok_a"), card(dec!(50), "tok_b")],
        ),
    )
    .await;
    assert_eq!(order.status, PaymentStatus::PendingAuthorize);
}
