//! Webhook adapter
//!
//! Normalizes inbound settlement callbacks into ledger and order state.
//! Delivery is at-least-once: events referencing an unknown or already
//! terminal transaction are logged and discarded, so replays are no-ops.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use vend_ledger::Ledger;
use vend_methods::MethodRegistry;
use vend_orders::OrderStore;
use vend_types::{
    Actor, OrderStatus, PaymentStatus, ProviderPaymentStatus, Result, Transaction,
    TransactionStatus, VendError, WebhookEvent,
};

/// Translates normalized settlement events into state transitions
#[derive(Clone)]
pub struct WebhookAdapter {
    ledger: Ledger,
    orders: OrderStore,
    registry: Arc<MethodRegistry>,
}

impl WebhookAdapter {
    pub fn new(ledger: Ledger, orders: OrderStore, registry: Arc<MethodRegistry>) -> Self {
        Self {
            ledger,
            orders,
            registry,
        }
    }

    /// Parse a raw provider payload (already verified upstream) and handle
    /// it. Malformed payloads are an external-service failure.
    pub async fn handle_json(&self, payload: Value) -> Result<()> {
        let event: WebhookEvent = serde_json::from_value(payload)
            .map_err(|e| VendError::provider("webhook", format!("malformed payload: {}", e)))?;
        self.handle_payment_webhook(event).await
    }

    /// Handle one normalized settlement event.
    ///
    /// Always `Ok` for events that correlate to nothing or to terminal
    /// state; the caller cannot do anything useful with a replayed delivery.
    pub async fn handle_payment_webhook(&self, event: WebhookEvent) -> Result<()> {
        match event {
            WebhookEvent::CryptoConfirmation {
                address,
                tx_hash,
                confirmations,
            } => {
                self.handle_crypto_confirmation(&address, &tx_hash, confirmations)
                    .await
            }
            WebhookEvent::HostedPayment {
                provider,
                external_id,
                status,
                amount,
            } => {
                if status != ProviderPaymentStatus::Succeeded {
                    info!(%provider, %external_id, ?status, "ignoring non-succeeded payment event");
                    return Ok(());
                }
                let Some(tx) = self.ledger.find_by_external_id(&external_id).await else {
                    warn!(%provider, %external_id, "payment event for unknown transaction; discarded");
                    return Ok(());
                };
                if tx.status.is_terminal() {
                    info!(tx = %tx.id, %external_id, "payment event replay; discarded");
                    return Ok(());
                }
                if amount != tx.amount.total {
                    warn!(
                        tx = %tx.id,
                        expected = %tx.amount.total,
                        reported = %amount,
                        "payment event amount mismatch; held for review"
                    );
                    self.ledger
                        .annotate(&tx.id, format!("provider reported amount {}", amount))
                        .await?;
                    return Ok(());
                }
                self.settle_payment(&tx, format!("{} reported success", provider))
                    .await
            }
            WebhookEvent::HostedRefund {
                provider,
                external_id,
                status,
            } => {
                if status != ProviderPaymentStatus::Succeeded {
                    info!(%provider, %external_id, ?status, "ignoring non-succeeded refund event");
                    return Ok(());
                }
                let Some(tx) = self.ledger.find_by_external_id(&external_id).await else {
                    warn!(%provider, %external_id, "refund event for unknown transaction; discarded");
                    return Ok(());
                };
                if tx.status.is_terminal() {
                    info!(tx = %tx.id, %external_id, "refund event replay; discarded");
                    return Ok(());
                }
                self.ledger
                    .advance(
                        &tx.id,
                        TransactionStatus::Completed,
                        format!("{} confirmed refund", provider),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_crypto_confirmation(
        &self,
        address: &str,
        tx_hash: &str,
        confirmations: u32,
    ) -> Result<()> {
        let Some(tx) = self.ledger.find_pending_by_wallet_address(address).await else {
            info!(%address, %tx_hash, "confirmation for unknown or settled address; discarded");
            return Ok(());
        };

        let threshold = match self.registry.get(&tx.method) {
            Ok(method) => method.confirmations_for_address(address),
            Err(_) => None,
        };
        let Some(threshold) = threshold else {
            warn!(tx = %tx.id, %address, "no confirmation threshold configured; discarded");
            return Ok(());
        };

        self.ledger.attach_external_id(&tx.id, tx_hash).await?;

        if confirmations < threshold {
            info!(tx = %tx.id, confirmations, threshold, "below confirmation threshold");
            self.ledger
                .annotate(
                    &tx.id,
                    format!("{} of {} confirmations", confirmations, threshold),
                )
                .await?;
            return Ok(());
        }

        self.orders
            .record_external_tx(&tx.order_id, tx_hash)
            .await?;
        self.settle_payment(&tx, format!("{} confirmations on-chain", confirmations))
            .await
    }

    /// Mark the payment transaction completed and advance its order to
    /// `Processing`. An order that already left `PendingPayment` (raced by
    /// expiry or an admin) keeps its state; the settled transaction stays on
    /// record for review.
    async fn settle_payment(&self, tx: &Transaction, note: String) -> Result<()> {
        self.ledger
            .advance(&tx.id, TransactionStatus::Completed, note.clone())
            .await?;
        self.orders
            .set_payment_status(&tx.order_id, PaymentStatus::Completed)
            .await?;

        match self
            .orders
            .update_status(&tx.order_id, OrderStatus::Processing, note, Actor::System)
            .await
        {
            Ok(_) => Ok(()),
            Err(VendError::InvalidTransition { order_id, from, .. }) => {
                warn!(
                    %order_id,
                    %from,
                    tx = %tx.id,
                    "payment settled but order no longer pending; left for review"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
