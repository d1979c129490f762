//! Refund execution
//!
//! A refund is its own ledger transaction referencing the settled payment it
//! reverses. Dispatch is exhaustive over the method kind: hosted providers
//! get a refund API call, everything else queues for manual execution.
//!
//! A failed hosted refund marks the transaction failed, surfaces the
//! provider error to the caller, and leaves the order exactly where it was.
//! Money-moving calls are never silently retried.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use vend_ledger::Ledger;
use vend_methods::{MethodKind, MethodRegistry};
use vend_orders::{AdminGate, NotifierPort, OrderStore};
use vend_types::{
    Actor, AmountBreakdown, OrderId, OrderStatus, PaymentStatus, Result, Transaction,
    TransactionDetails, TransactionKind, TransactionStatus, VendError,
};

use crate::provider::ProviderMap;

/// Dispatches refunds across settlement backends
pub struct RefundExecutor {
    ledger: Ledger,
    orders: OrderStore,
    registry: Arc<MethodRegistry>,
    providers: ProviderMap,
    notifier: Arc<dyn NotifierPort>,
    admin_gate: Arc<dyn AdminGate>,
}

impl RefundExecutor {
    pub fn new(
        ledger: Ledger,
        orders: OrderStore,
        registry: Arc<MethodRegistry>,
        providers: ProviderMap,
        notifier: Arc<dyn NotifierPort>,
        admin_gate: Arc<dyn AdminGate>,
    ) -> Self {
        Self {
            ledger,
            orders,
            registry,
            providers,
            notifier,
            admin_gate,
        }
    }

    /// Execute a refund for an order.
    ///
    /// Admin-gated. The refund transaction is recorded before dispatch so a
    /// provider failure still leaves an auditable failed attempt.
    pub async fn process_refund(
        &self,
        order_id: &OrderId,
        amount: Decimal,
        reason: impl Into<String> + Send,
        actor: Actor,
    ) -> Result<Transaction> {
        let authorized = match &actor {
            Actor::Admin(id) => self.admin_gate.is_admin(id).await,
            Actor::System => true,
            Actor::Buyer(_) => false,
        };
        if !authorized {
            return Err(VendError::Unauthorized {
                actor: actor.to_string(),
            });
        }

        let reason = reason.into();
        let order = self.orders.get(order_id).await?;
        if amount > order.amount.total {
            return Err(VendError::RefundExceedsTotal {
                requested: amount,
                total: order.amount.total,
            });
        }
        let original = self
            .ledger
            .settled_payment_for_order(order_id)
            .await
            .ok_or_else(|| VendError::NoSettledPayment {
                order_id: order_id.to_string(),
            })?;
        let method = self.registry.get(&order.method)?;

        let refund = self
            .ledger
            .record(Transaction::new(
                order.id.clone(),
                order.buyer.clone(),
                method.name.clone(),
                AmountBreakdown::fee_free(amount),
                TransactionKind::Refund,
                TransactionDetails {
                    refund_reason: Some(reason.clone()),
                    original_tx: Some(original.id.clone()),
                    ..Default::default()
                },
                actor.clone(),
            ))
            .await?;

        match method.kind {
            MethodKind::Hosted(provider) => {
                let adapter = self.providers.get(&provider).ok_or_else(|| {
                    error!(%provider, method = %method.name, "no settlement adapter registered");
                    VendError::UnsupportedPaymentMethod {
                        method: method.name.clone(),
                        detail: format!("no adapter registered for {}", provider),
                    }
                })?;
                let original_external =
                    original.details.external_tx_id.clone().ok_or_else(|| {
                        VendError::NoSettledPayment {
                            order_id: order_id.to_string(),
                        }
                    })?;

                match adapter.create_refund(&original_external, amount).await {
                    Ok(refund_external_id) => {
                        self.ledger
                            .attach_external_id(&refund.id, refund_external_id)
                            .await?;
                        let refund = self
                            .ledger
                            .advance(
                                &refund.id,
                                TransactionStatus::Completed,
                                format!("{} accepted refund", provider),
                            )
                            .await?;
                        self.finish_refund(order_id, &reason, &actor).await?;
                        info!(order = %order_id, tx = %refund.id, "hosted refund completed");
                        Ok(refund)
                    }
                    Err(e) => {
                        // Order stays untouched; the caller decides what
                        // happens next.
                        warn!(order = %order_id, %provider, error = %e, "hosted refund failed");
                        self.ledger
                            .advance(&refund.id, TransactionStatus::Failed, e.to_string())
                            .await?;
                        Err(e)
                    }
                }
            }
            MethodKind::Crypto | MethodKind::Voucher(_) | MethodKind::Manual => {
                // Cannot be automated; queue for an operator.
                if let Err(e) = self
                    .notifier
                    .notify_admins(&format!(
                        "Manual refund required: order {}, amount {}, reason: {}",
                        order.order_number, amount, reason
                    ))
                    .await
                {
                    warn!(order = %order_id, error = %e, "admin refund notification failed");
                }
                self.finish_refund(order_id, &reason, &actor).await?;
                info!(order = %order_id, tx = %refund.id, "refund queued for manual execution");
                self.ledger.get(&refund.id).await
            }
        }
    }

    async fn finish_refund(&self, order_id: &OrderId, reason: &str, actor: &Actor) -> Result<()> {
        self.orders
            .update_status(
                order_id,
                OrderStatus::Refunded,
                format!("refunded: {}", reason),
                actor.clone(),
            )
            .await?;
        self.orders
            .set_payment_status(order_id, PaymentStatus::Refunded)
            .await
    }
}
