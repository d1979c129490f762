//! Reconciliation sweep behavior: stale transactions and lost timers

mod common;

use chrono::Duration;
use rust_decimal_macros::dec;

use common::{harness, StaticCart};
use vend_checkout::CheckoutConfig;
use vend_types::{OrderStatus, ProviderPaymentStatus, TransactionStatus};

fn sweep_config() -> CheckoutConfig {
    CheckoutConfig {
        pending_tx_age: Duration::seconds(0),
        ..CheckoutConfig::default()
    }
}

#[tokio::test]
async fn stale_crypto_transaction_resolves_once_confirmed_on_chain() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), sweep_config());
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();
    h.engine
        .confirm_payment(&order.id, Some("hash999999"))
        .await
        .unwrap();

    // Two confirmations: below the threshold of three, nothing resolves
    h.explorer
        .confirmations
        .lock()
        .insert("hash999999".to_string(), 2);
    assert_eq!(h.sweep.check_pending_transactions().await.unwrap(), 0);
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::PendingPayment
    );

    // Six confirmations: resolves and advances the order
    h.explorer
        .confirmations
        .lock()
        .insert("hash999999".to_string(), 6);
    assert_eq!(h.sweep.check_pending_transactions().await.unwrap(), 1);
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::Processing
    );

    // Nothing pending is left for the next pass
    assert_eq!(h.sweep.check_pending_transactions().await.unwrap(), 0);
}

#[tokio::test]
async fn stale_hosted_payment_resolves_from_provider_status() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), sweep_config());
    let (order, _) = h.engine.select_method(&h.buyer, "card", None).await.unwrap();
    h.engine.confirm_payment(&order.id, None).await.unwrap();
    h.engine
        .register_hosted_session(&order.id, "pi_9")
        .await
        .unwrap();

    h.stripe
        .set_status("pi_9", ProviderPaymentStatus::Succeeded)
        .await;

    assert_eq!(h.sweep.check_pending_transactions().await.unwrap(), 1);
    let order = h.orders.get(&order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn stale_hosted_payment_fails_when_provider_reports_failure() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), sweep_config());
    let (order, _) = h.engine.select_method(&h.buyer, "card", None).await.unwrap();
    h.engine.confirm_payment(&order.id, None).await.unwrap();
    h.engine
        .register_hosted_session(&order.id, "pi_9")
        .await
        .unwrap();

    h.stripe
        .set_status("pi_9", ProviderPaymentStatus::Failed)
        .await;

    assert_eq!(h.sweep.check_pending_transactions().await.unwrap(), 1);
    let txs = h.ledger.transactions_for_order(&order.id).await;
    assert_eq!(txs[0].status, TransactionStatus::Failed);
    // The order keeps waiting for another attempt
    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::PendingPayment
    );
}

#[tokio::test]
async fn stale_voucher_transaction_is_resurfaced_to_admins() {
    let h = harness(StaticCart::with_subtotal(dec!(50)), sweep_config());
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "psc-voucher", None)
        .await
        .unwrap();
    h.engine
        .confirm_payment(&order.id, Some("CODE-123456"))
        .await
        .unwrap();

    h.sweep.check_pending_transactions().await.unwrap();

    let reminders: Vec<String> = h
        .notifier
        .admin_messages
        .lock()
        .iter()
        .filter(|m| m.contains("still awaits manual handling"))
        .cloned()
        .collect();
    assert_eq!(reminders.len(), 1);
}

#[tokio::test]
async fn background_loop_expires_unpaid_orders() {
    let config = CheckoutConfig {
        payment_timeout: Duration::seconds(0),
        pending_tx_age: Duration::seconds(0),
        sweep_interval: std::time::Duration::from_millis(50),
    };
    let h = harness(StaticCart::with_subtotal(dec!(50)), config);
    let (order, _) = h
        .engine
        .select_method(&h.buyer, "btc-transfer", None)
        .await
        .unwrap();

    h.sweep.start().await.unwrap();
    assert!(h.sweep.is_running());
    // Starting twice is refused
    assert!(h.sweep.start().await.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    assert_eq!(
        h.orders.get(&order.id).await.unwrap().status,
        OrderStatus::Cancelled
    );

    h.sweep.stop().await.unwrap();
    assert!(!h.sweep.is_running());
}
