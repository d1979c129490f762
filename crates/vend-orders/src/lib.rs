//! Vend Orders - The order aggregate and its status machine
//!
//! Orders are mutated only through [`OrderStore::update_status`] and the
//! narrow settlement/fulfillment operations here, never by direct field
//! writes, so the timeline stays the authoritative record of what happened.
//!
//! Transition validation and the commit happen under one write lock; side
//! effects (restock on cancellation, buyer notification) run after the
//! commit and never roll it back. A notification failure is logged, not
//! propagated, per the notifier contract.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{info, warn};

use vend_types::{
    Actor, AmountBreakdown, FulfillmentStatus, LineItem, Order, OrderId, OrderStatus,
    PaymentStatus, Result, SettlementDetails, UserId, VendError,
};

/// Catalog collaborator: releases finite-stock reservations when an order
/// is cancelled.
#[async_trait::async_trait]
pub trait CatalogPort: Send + Sync {
    async fn restock(&self, product_id: &vend_types::ProductId, quantity: u32) -> Result<()>;
}

/// Notification collaborator. Fire-and-forget from the engine's
/// perspective: delivery and retry policy live on the other side.
#[async_trait::async_trait]
pub trait NotifierPort: Send + Sync {
    async fn notify_user(&self, user: &UserId, message: &str) -> Result<()>;
    async fn notify_admins(&self, message: &str) -> Result<()>;
}

/// Administrative-actor check, consulted before verification and refund
/// operations.
#[async_trait::async_trait]
pub trait AdminGate: Send + Sync {
    async fn is_admin(&self, actor: &UserId) -> bool;
}

fn generate_order_number() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

/// The order store
#[derive(Clone)]
pub struct OrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    by_number: Arc<RwLock<HashMap<String, OrderId>>>,
    catalog: Arc<dyn CatalogPort>,
    notifier: Arc<dyn NotifierPort>,
}

impl OrderStore {
    pub fn new(catalog: Arc<dyn CatalogPort>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            by_number: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            notifier,
        }
    }

    /// Create an order from snapshotted cart contents.
    ///
    /// An order with zero line items is rejected here, which is what keeps
    /// `PendingPayment` unreachable for empty orders.
    pub async fn create(
        &self,
        buyer: UserId,
        contact: Option<String>,
        items: Vec<LineItem>,
        method: impl Into<String>,
        amount: AmountBreakdown,
    ) -> Result<Order> {
        if items.is_empty() {
            return Err(VendError::EmptyCart);
        }
        if !amount.is_consistent() {
            return Err(VendError::invalid_input(
                "amount",
                "total does not equal subtotal + fees",
            ));
        }

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            order_number: generate_order_number(),
            buyer,
            contact,
            items,
            method: method.into(),
            payment_status: PaymentStatus::Pending,
            amount,
            settlement: SettlementDetails::default(),
            status: OrderStatus::Created,
            timeline: Vec::new(),
            admin_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        order.record_status(OrderStatus::Created, "order created", Actor::System);

        let mut orders = self.orders.write().await;
        let mut by_number = self.by_number.write().await;
        by_number.insert(order.order_number.clone(), order.id.clone());
        orders.insert(order.id.clone(), order.clone());
        info!(order = %order.id, number = %order.order_number, "order created");
        Ok(order)
    }

    pub async fn get(&self, order_id: &OrderId) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| VendError::order_not_found(order_id))
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<Order> {
        let id = self
            .by_number
            .read()
            .await
            .get(order_number)
            .cloned()
            .ok_or_else(|| VendError::OrderNotFound {
                order_id: order_number.to_string(),
            })?;
        self.get(&id).await
    }

    /// All orders for a buyer, newest first
    pub async fn orders_for_user(&self, user: &UserId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| &o.buyer == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub async fn orders_with_status(&self, status: OrderStatus) -> Vec<Order> {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    /// Orders sitting in `PendingPayment` since before `cutoff`, for the
    /// expiry sweep (covers timers lost to a restart)
    pub async fn pending_payment_older_than(&self, cutoff: DateTime<Utc>) -> Vec<Order> {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| {
                o.status == OrderStatus::PendingPayment
                    && o.pending_payment_since()
                        .map_or(false, |since| since < cutoff)
            })
            .cloned()
            .collect()
    }

    /// Drive the status machine.
    ///
    /// Re-entering the current status is an idempotent no-op (returns the
    /// unchanged order, appends nothing). An illegal edge or a terminal
    /// current status is `InvalidTransition`. The amount invariant is
    /// revalidated before anything is written; a violation commits nothing.
    pub async fn update_status(
        &self,
        order_id: &OrderId,
        new_status: OrderStatus,
        note: impl Into<String> + Send,
        actor: Actor,
    ) -> Result<Order> {
        let committed = {
            let mut orders = self.orders.write().await;
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| VendError::order_not_found(order_id))?;

            if order.status == new_status {
                return Ok(order.clone());
            }
            if !order.status.can_transition_to(new_status) {
                return Err(VendError::InvalidTransition {
                    order_id: order_id.to_string(),
                    from: order.status,
                    to: new_status,
                });
            }
            if !order.amount.is_consistent() {
                return Err(VendError::AmountMismatch {
                    order_id: order_id.to_string(),
                });
            }

            order.record_status(new_status, note, actor);
            info!(order = %order.id, status = %new_status, "order transitioned");
            order.clone()
        };

        // Side effects run after the commit, outside the lock. They never
        // undo the transition.
        if new_status == OrderStatus::Cancelled {
            for item in &committed.items {
                if let Err(e) = self.catalog.restock(&item.product_id, item.quantity).await {
                    warn!(order = %committed.id, product = %item.product_id, error = %e, "restock failed");
                }
            }
        }

        let message = format!(
            "Order {} is now {}",
            committed.order_number, committed.status
        );
        if let Err(e) = self.notifier.notify_user(&committed.buyer, &message).await {
            warn!(order = %committed.id, error = %e, "buyer notification failed");
        }

        Ok(committed)
    }

    /// Re-point a not-yet-paid order at a different method with its
    /// recomputed charge. Allowed only before any payment settles.
    pub async fn change_method(
        &self,
        order_id: &OrderId,
        method: impl Into<String> + Send,
        amount: AmountBreakdown,
    ) -> Result<Order> {
        if !amount.is_consistent() {
            return Err(VendError::AmountMismatch {
                order_id: order_id.to_string(),
            });
        }
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        if !matches!(
            order.status,
            OrderStatus::Created | OrderStatus::PendingPayment
        ) {
            return Err(VendError::InvalidTransition {
                order_id: order_id.to_string(),
                from: order.status,
                to: OrderStatus::PendingPayment,
            });
        }
        order.method = method.into();
        order.amount = amount;
        order.settlement = SettlementDetails::default();
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    /// Mirror the payment block's status. Kept separate from the order
    /// status machine; no timeline entry.
    pub async fn set_payment_status(
        &self,
        order_id: &OrderId,
        payment_status: PaymentStatus,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        order.payment_status = payment_status;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Attach buyer-submitted proof and the generated reference to the
    /// payment block.
    pub async fn record_proof(
        &self,
        order_id: &OrderId,
        proof: impl Into<String> + Send,
        verification_code: Option<String>,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        order.settlement.proof = Some(proof.into());
        if verification_code.is_some() {
            order.settlement.verification_code = verification_code;
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Record the method-generated reference the buyer will quote back.
    pub async fn set_verification_code(
        &self,
        order_id: &OrderId,
        code: impl Into<String> + Send,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        order.settlement.verification_code = Some(code.into());
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Record the external settlement transaction id on the payment block.
    pub async fn record_external_tx(
        &self,
        order_id: &OrderId,
        external_tx_id: impl Into<String> + Send,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        order.settlement.external_tx_id = Some(external_tx_id.into());
        order.updated_at = Utc::now();
        Ok(())
    }

    pub async fn add_admin_note(
        &self,
        order_id: &OrderId,
        note: impl Into<String> + Send,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VendError::order_not_found(order_id))?;
        order.admin_notes.push(note.into());
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Mark one line item delivered. When every item is delivered and the
    /// order is in `Processing`, the order completes.
    pub async fn mark_item_delivered(
        &self,
        order_id: &OrderId,
        item_index: usize,
        content: Option<String>,
    ) -> Result<Order> {
        let all_delivered = {
            let mut orders = self.orders.write().await;
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| VendError::order_not_found(order_id))?;
            let item = order.items.get_mut(item_index).ok_or_else(|| {
                VendError::invalid_input("item_index", format!("no line item {}", item_index))
            })?;
            item.fulfillment = FulfillmentStatus::Delivered;
            item.delivered_content = content;
            order.updated_at = Utc::now();
            order.fully_delivered() && order.status == OrderStatus::Processing
        };

        if all_delivered {
            return self
                .update_status(
                    order_id,
                    OrderStatus::Completed,
                    "all items delivered",
                    Actor::System,
                )
                .await;
        }
        self.get(order_id).await
    }
}
