use futures::future::join_all;
use payorch::application::transition::{Transition, TransitionEngine};
use payorch::domain::payment::{Amount, ClientReference, Currency, NewPayment, PaymentId, PaymentType};
use payorch::domain::ports::PaymentStore;
use payorch::domain::status::PaymentStatus;
use payorch::domain::transitions::{can_transition, should_ignore_transition};
use payorch::error::PaymentError;
use payorch::infrastructure::in_memory::InMemoryPaymentStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

async fn seed(store: &InMemoryPaymentStore, status: PaymentStatus) -> PaymentId {
    let mut tx = store.begin().await.unwrap();
    let mut payment = tx
        .insert_payment(NewPayment {
            order_id: 1,
            gateway_method_id: 1,
            client_reference: ClientReference::first(format!("seed-{status}")),
            amount: Amount::new(dec!(25.00)).unwrap(),
            interest: dec!(0),
            currency: Currency::Brl,
            installments: 1,
            r#type: PaymentType::CreditCard,
        })
        .await
        .unwrap();
    payment.status = status;
    tx.update_payment(payment.clone()).unwrap();
    tx.commit().await.unwrap();
    payment.id
}

#[tokio::test]
async fn test_engine_follows_tables_for_every_pair() {
    for from in PaymentStatus::iter() {
        for to in PaymentStatus::iter() {
            let store = Arc::new(InMemoryPaymentStore::new());
            let id = seed(&store, from).await;
            let engine = TransitionEngine::new(store.clone());
            let history_before = store.status_history(id).await.unwrap().len();

            let result = engine.transition_to(id, to, |_| async { Ok(()) }).await;
            let stored = store.get(id).await.unwrap().unwrap();
            let history_after = store.status_history(id).await.unwrap().len();

            if should_ignore_transition(from, to) {
                assert!(matches!(result, Ok(Transition::Ignored { .. })), "{from} -> {to}");
                assert_eq!(stored.status, from);
                assert_eq!(history_after, history_before, "{from} -> {to}");
            } else if can_transition(from, to) {
                assert!(matches!(result, Ok(Transition::Applied { .. })), "{from} -> {to}");
                assert_eq!(stored.status, to);
                assert_eq!(history_after, history_before + 1, "{from} -> {to}");
            } else {
                assert!(
                    matches!(result, Err(PaymentError::InvalidStateChange { .. })),
                    "{from} -> {to}"
                );
                assert_eq!(stored.status, from);
                assert_eq!(history_after, history_before, "{from} -> {to}");
            }
        }
    }
}

#[tokio::test]
async fn test_repeated_transition_is_idempotent() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let id = seed(&store, PaymentStatus::Authorized).await;
    let engine = TransitionEngine::new(store.clone());

    let first = engine
        .transition_to(id, PaymentStatus::PendingCancel, |_| async { Ok(()) })
        .await
        .unwrap();
    let second = engine
        .transition_to(id, PaymentStatus::PendingCancel, |_| async { Ok(()) })
        .await
        .unwrap();

    assert!(first.is_applied());
    assert!(!second.is_applied());
    assert_eq!(second.payment().status, PaymentStatus::PendingCancel);
}

#[tokio::test]
async fn test_concurrent_transitions_run_action_once() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let id = seed(&store, PaymentStatus::Authorized).await;
    let engine = TransitionEngine::new(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let attempts = (0..16).map(|_| {
        let engine = engine.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            engine
                .transition_to(id, PaymentStatus::PendingCancel, |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok(())
                })
                .await
        })
    });
    let results = join_all(attempts).await;

    let applied = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(Transition::is_applied)
        .count();
    assert_eq!(applied, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_compensation_skipped_when_payment_moved_on() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let id = seed(&store, PaymentStatus::Authorized).await;
    let engine = TransitionEngine::new(store.clone());
    let inner_engine = engine.clone();

    let result = engine
        .transition_to(id, PaymentStatus::PendingCancel, |_| async move {
            // A webhook settles the cancellation while the call is in flight.
            inner_engine
                .transition_to(id, PaymentStatus::Cancelled, |_| async { Ok(()) })
                .await?;
            Err::<(), _>(PaymentError::StorageError("lost answer".to_string()))
        })
        .await;

    assert!(matches!(result, Err(PaymentError::StorageError(_))));
    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Cancelled);
}
