//! End-to-end checkout flows across the engine crates

mod common;

use chrono::Duration;
use rust_decimal_macros::dec;

use common::{harness, StaticCart};
use vend_checkout::{CheckoutConfig, ConfirmOutcome, SessionStage};
use vend_types::{
    Actor, OrderStatus, PaymentStatus, ProviderPaymentStatus, TransactionStatus, UserId,
    WebhookEvent,
};

fn admin() -> Actor {
    Actor::Admin(UserId::new("ops"))
}

#[tokio::test]
async fn cart_of_fifty_with_two_percent_fee_settles_after_approval() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());

    // Offers quote subtotal + 2% fee
    let quote = h.engine.start_checkout(&h.buyer).await.unwrap();
    let offer = quote
        .offers
        .iter()
        .find(|o| o.method.name == "btc-transfer")
        .unwrap();
    assert_eq!(offer.amount.subtotal, dec!(50));
    assert_eq!(offer.amount.total, dec!(51.00));

    let (order, _instructions) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.amount.total, dec!(51.00));

    let outcome = h
        .engine
        .confirm_payment(&order.id, Some("hash123"))
        .await
        .unwrap();
    let tx = match outcome {
        ConfirmOutcome::AwaitingVerification(tx) => tx,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::PendingPayment
    );

    let order = h
        .engine
        .verify_manual_payment(&order.id, true, None, admin())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(
        h.ledger.get(&tx.id).await.unwrap().status,
        TransactionStatus::Completed
    );
    // Approval disarms the expiry
    assert!(!h.engine.expiry().contains(&order.id).await);
}

#[tokio::test]
async fn cart_below_method_minimum_finds_no_methods() {
    let h = harness(StaticCart::with_subtotal(dec!(5)), CheckoutConfig::default());

    let err = h.engine.start_checkout(&h.buyer).await.unwrap_err();
    assert_eq!(err.error_code(), "NO_METHOD_AVAILABLE");

    assert!(h.registry.available_methods(dec!(5), None).await.is_empty());
}

#[tokio::test]
async fn amount_invariant_holds_across_the_whole_flow() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "psc-voucher", None)
        .await
        .unwrap();
    h.engine
        .confirm_payment(&order.id, Some("CODE-123456"))
        .await
        .unwrap();
    h.engine
        .verify_manual_payment(&order.id, true, None, admin())
        .await
        .unwrap();

    let order = h.orders.get(&order.id).await.unwrap();
    assert!(order.amount.is_consistent());
    for entry in &order.timeline {
        // Every committed transition left the breakdown intact
        assert!(order.amount.total == order.amount.subtotal + order.amount.fees, "{:?}", entry);
    }
}

#[tokio::test]
async fn voucher_code_cannot_be_submitted_twice() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());

    let (first, _) = h
        .engine
        .select_method(&h.buyer, "psc-voucher", None)
        .await
        .unwrap();
    h.engine
        .confirm_payment(&first.id, Some("CODE-123456"))
        .await
        .unwrap();

    let other_buyer = UserId::new("buyer-2");
    let (second, _) = h
        .engine
        .select_method(&other_buyer, "psc-voucher", None)
        .await
        .unwrap();
    let err = h
        .engine
        .confirm_payment(&second.id, Some("CODE-123456"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VOUCHER_ALREADY_USED");

    // The rejected submission changed nothing on the second order
    let second = h.orders.get(&second.id).await.unwrap();
    assert_eq!(second.status, OrderStatus::PendingPayment);
    assert!(second.settlement.proof.is_none());
    assert!(h.ledger.transactions_for_order(&second.id).await.is_empty());
}

#[tokio::test]
async fn rejected_proof_allows_resubmission() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();
    h.engine
        .confirm_payment(&order.id, Some("deadbeef"))
        .await
        .unwrap();

    let order_after = h
        .engine
        .verify_manual_payment(&order.id, false, Some("hash not found".to_string()), admin())
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::PendingPayment);
    assert_eq!(order_after.payment_status, PaymentStatus::Failed);
    assert_eq!(
        h.engine.session(&order.id).await.unwrap().stage,
        SessionStage::AwaitingPayment
    );

    // Buyer resubmits and the second attempt settles
    h.engine
        .confirm_payment(&order.id, Some("cafebabe"))
        .await
        .unwrap();
    let order_after = h
        .engine
        .verify_manual_payment(&order.id, true, None, admin())
        .await
        .unwrap();
    assert_eq!(order_after.status, OrderStatus::Processing);
}

#[tokio::test]
async fn unpaid_order_expires_exactly_once() {
    let config = CheckoutConfig {
        payment_timeout: Duration::seconds(0),
        ..CheckoutConfig::default()
    };
    let h = harness(StaticCart::with_subtotal(dec!(50)), config);
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();

    assert_eq!(h.engine.expire_stale_orders().await.unwrap(), 1);

    let order = h.orders.get(&order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    let cancelled_entries: Vec<_> = order
        .timeline
        .iter()
        .filter(|e| e.status == OrderStatus::Cancelled)
        .collect();
    assert_eq!(cancelled_entries.len(), 1);
    assert_eq!(cancelled_entries[0].note, "payment expired");

    // Stock went back and the buyer heard about it
    assert_eq!(h.catalog.restocked.lock().clone(), vec![("prod-1".to_string(), 1)]);

    // A second sweep finds nothing to do
    assert_eq!(h.engine.expire_stale_orders().await.unwrap(), 0);
    assert!(h.engine.session(&order.id).await.is_none());
}

#[tokio::test]
async fn lost_timer_is_recovered_by_the_sweep() {
    let config = CheckoutConfig {
        payment_timeout: Duration::seconds(0),
        ..CheckoutConfig::default()
    };
    let h = harness(StaticCart::with_subtotal(dec!(50)), config);
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();

    // Simulate a process restart that lost the scheduled entry
    h.engine.expiry().cancel(&order.id).await;

    assert_eq!(h.engine.expire_stale_orders().await.unwrap(), 1);
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn cancelling_checkout_disarms_the_timer() {
    let config = CheckoutConfig {
        payment_timeout: Duration::seconds(0),
        ..CheckoutConfig::default()
    };
    let h = harness(StaticCart::with_subtotal(dec!(50)), config);
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();

    h.engine
        .cancel_payment(&order.id, Actor::Buyer(h.buyer.clone()))
        .await
        .unwrap();
    assert!(!h.engine.expiry().contains(&order.id).await);

    // The due sweep has nothing left to expire
    assert_eq!(h.engine.expire_stale_orders().await.unwrap(), 0);
    let order = h.orders.get(&order.id).await.unwrap();
    assert_eq!(
        order
            .timeline
            .iter()
            .filter(|e| e.status == OrderStatus::Cancelled)
            .count(),
        1
    );
}

#[tokio::test]
async fn reselecting_a_method_replaces_the_expiry_entry() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();
    let first_fires_at = h.engine.expiry().fires_at(&order.id).await.unwrap();

    let (order, instructions) = h
        .engine
        .reselect_method(&order.id, "psc-voucher")
        .await
        .unwrap();
    assert_eq!(order.method, "psc-voucher");
    assert!(instructions.reference().unwrap().starts_with("PSC-"));

    let second_fires_at = h.engine.expiry().fires_at(&order.id).await.unwrap();
    assert!(second_fires_at >= first_fires_at);
    assert_eq!(
        h.engine.session(&order.id).await.unwrap().method,
        "psc-voucher"
    );
}

#[tokio::test]
async fn hosted_flow_hands_off_and_settles_through_webhook() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());
    let (order, _) = h.engine.select_method(&h.buyer, "card", None).await.unwrap();

    let outcome = h.engine.confirm_payment(&order.id, None).await.unwrap();
    let tx = match outcome {
        ConfirmOutcome::HandOff(tx) => tx,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(
        h.engine.session(&order.id).await.unwrap().stage,
        SessionStage::HandedOff
    );

    h.engine
        .register_hosted_session(&order.id, "pi_123")
        .await
        .unwrap();

    h.webhooks
        .handle_payment_webhook(WebhookEvent::HostedPayment {
            provider: "stripe".to_string(),
            external_id: "pi_123".to_string(),
            status: ProviderPaymentStatus::Succeeded,
            amount: dec!(51.00),
        })
        .await
        .unwrap();

    assert_eq!(
        h.ledger.get(&tx.id).await.unwrap().status,
        TransactionStatus::Completed
    );
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::Processing
    );
}

#[tokio::test]
async fn confirm_without_session_is_rejected() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), CheckoutConfig::default());
    let err = h
        .engine
        .confirm_payment(&vend_types::OrderId::new(), Some("hash123"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn empty_cart_cannot_start_checkout() {
    let h = harness(StaticCart::with_subtotal(dec!(0)), CheckoutConfig::default());
    let err = h.engine.start_checkout(&h.buyer).await.unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_CART");

    let err = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_CART");
}
