//! Checkout orchestration
//!
//! One live session per order id. Every mutating operation takes the
//! per-order lock first, so two operations on the same order never
//! interleave; different orders proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use vend_ledger::Ledger;
use vend_methods::{
    payment_instructions, MethodKind, MethodRegistry, PaymentInstructions, PaymentMethod,
};
use vend_orders::{AdminGate, NotifierPort, OrderStore};
use vend_types::{
    Actor, AmountBreakdown, LineItem, Order, OrderId, OrderStatus, PaymentStatus, Result,
    Transaction, TransactionDetails, TransactionKind, TransactionStatus, UserId, VendError,
};

use crate::expiry::ExpirySchedule;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// How long an order may sit in `PendingPayment` before expiring
    pub payment_timeout: Duration,
    /// Age after which a pending transaction is re-queried by the sweep
    pub pending_tx_age: Duration,
    /// Cadence of the background reconciliation loop
    pub sweep_interval: std::time::Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payment_timeout: Duration::minutes(30),
            pending_tx_age: Duration::minutes(30),
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}

/// Cart contents as priced by the cart collaborator
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart collaborator
#[async_trait::async_trait]
pub trait CartPort: Send + Sync {
    async fn get_or_create(&self, user: &UserId) -> Result<CartSnapshot>;
}

/// One selectable method with the charge it would produce
#[derive(Debug, Clone)]
pub struct MethodOffer {
    pub method: PaymentMethod,
    pub amount: AmountBreakdown,
}

/// Result of starting a checkout: the priced cart and what can pay for it
#[derive(Debug, Clone)]
pub struct CheckoutQuote {
    pub cart: CartSnapshot,
    pub offers: Vec<MethodOffer>,
}

/// Where a checkout session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Instructions issued, waiting for the buyer to pay and submit proof
    AwaitingPayment,
    /// Proof submitted, waiting for an administrative decision
    AwaitingVerification,
    /// Handed off to a hosted provider flow
    HandedOff,
}

/// In-flight checkout state, keyed by order id
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub order_id: OrderId,
    pub buyer: UserId,
    pub method: String,
    pub instructions: PaymentInstructions,
    pub stage: SessionStage,
}

/// Outcome of a payment confirmation
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// Proof recorded; an administrator must verify it
    AwaitingVerification(Transaction),
    /// Hosted flow: settlement continues provider-side
    HandOff(Transaction),
}

/// The checkout orchestrator
#[derive(Clone)]
pub struct CheckoutEngine {
    orders: OrderStore,
    ledger: Ledger,
    registry: Arc<MethodRegistry>,
    cart: Arc<dyn CartPort>,
    notifier: Arc<dyn NotifierPort>,
    admin_gate: Arc<dyn AdminGate>,
    expiry: ExpirySchedule,
    sessions: Arc<RwLock<HashMap<OrderId, CheckoutSession>>>,
    locks: Arc<Mutex<HashMap<OrderId, Arc<Mutex<()>>>>>,
    config: CheckoutConfig,
}

impl CheckoutEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: OrderStore,
        ledger: Ledger,
        registry: Arc<MethodRegistry>,
        cart: Arc<dyn CartPort>,
        notifier: Arc<dyn NotifierPort>,
        admin_gate: Arc<dyn AdminGate>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            registry,
            cart,
            notifier,
            admin_gate,
            expiry: ExpirySchedule::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn expiry(&self) -> &ExpirySchedule {
        &self.expiry
    }

    pub async fn session(&self, order_id: &OrderId) -> Option<CheckoutSession> {
        self.sessions.read().await.get(order_id).cloned()
    }

    /// The per-order partition lock. Held for the duration of each mutating
    /// operation on that order.
    async fn order_lock(&self, order_id: &OrderId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(order_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Price the buyer's cart and list the methods that can settle it.
    pub async fn start_checkout(&self, user: &UserId) -> Result<CheckoutQuote> {
        let cart = self.cart.get_or_create(user).await?;
        if cart.is_empty() {
            return Err(VendError::EmptyCart);
        }

        let methods = self
            .registry
            .available_methods(cart.subtotal, Some(user))
            .await;
        if methods.is_empty() {
            return Err(VendError::NoMethodAvailable {
                amount: cart.subtotal,
            });
        }

        let offers = methods
            .into_iter()
            .map(|method| {
                let fee = method.fees.calculate(cart.subtotal);
                MethodOffer {
                    amount: AmountBreakdown::new(cart.subtotal, fee),
                    method,
                }
            })
            .collect();
        Ok(CheckoutQuote { cart, offers })
    }

    /// Create the order for a chosen method: snapshot the cart, compute the
    /// charge, issue instructions, and arm the expiration entry.
    pub async fn select_method(
        &self,
        user: &UserId,
        method_name: &str,
        contact: Option<String>,
    ) -> Result<(Order, PaymentInstructions)> {
        let cart = self.cart.get_or_create(user).await?;
        if cart.is_empty() {
            return Err(VendError::EmptyCart);
        }

        let method = self.registry.get(method_name)?;
        self.ensure_available(&method, cart.subtotal, user).await?;

        let fee = method.fees.calculate(cart.subtotal);
        let amount = AmountBreakdown::new(cart.subtotal, fee);
        let order = self
            .orders
            .create(user.clone(), contact, cart.items, method.name.as_str(), amount)
            .await?;
        let order = self
            .orders
            .update_status(
                &order.id,
                OrderStatus::PendingPayment,
                "payment instructions issued",
                Actor::Buyer(user.clone()),
            )
            .await?;

        let instructions = self.issue_instructions(&order, &method).await?;
        info!(order = %order.id, method = %method.name, "checkout method selected");
        Ok((order, instructions))
    }

    /// Switch an unpaid order to a different method. Replaces the expiry
    /// entry, which is what cancels the prior timer before arming the new
    /// one.
    pub async fn reselect_method(
        &self,
        order_id: &OrderId,
        method_name: &str,
    ) -> Result<(Order, PaymentInstructions)> {
        let lock = self.order_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self.orders.get(order_id).await?;
        let method = self.registry.get(method_name)?;
        self.ensure_available(&method, order.amount.subtotal, &order.buyer)
            .await?;

        let fee = method.fees.calculate(order.amount.subtotal);
        let amount = AmountBreakdown::new(order.amount.subtotal, fee);
        let order = self
            .orders
            .change_method(order_id, method.name.as_str(), amount)
            .await?;

        let instructions = self.issue_instructions(&order, &method).await?;
        info!(order = %order.id, method = %method.name, "checkout method reselected");
        Ok((order, instructions))
    }

    async fn ensure_available(
        &self,
        method: &PaymentMethod,
        amount: Decimal,
        user: &UserId,
    ) -> Result<()> {
        if self.registry.is_available(method, amount, Some(user)).await {
            return Ok(());
        }
        Err(VendError::AmountOutsideLimits {
            method: method.name.clone(),
            amount,
            min: method.limits.min_amount,
            max: method.limits.max_amount,
        })
    }

    async fn issue_instructions(
        &self,
        order: &Order,
        method: &PaymentMethod,
    ) -> Result<PaymentInstructions> {
        let instructions = payment_instructions(
            method,
            order.amount.total,
            &order.id,
            &order.order_number,
        )?;
        if let Some(reference) = instructions.reference() {
            self.orders
                .set_verification_code(&order.id, reference)
                .await?;
        }

        self.expiry
            .schedule(order.id.clone(), Utc::now() + self.config.payment_timeout)
            .await;
        self.sessions.write().await.insert(
            order.id.clone(),
            CheckoutSession {
                order_id: order.id.clone(),
                buyer: order.buyer.clone(),
                method: method.name.clone(),
                instructions: instructions.clone(),
                stage: SessionStage::AwaitingPayment,
            },
        );
        Ok(instructions)
    }

    /// Take the buyer's payment confirmation.
    ///
    /// Manual-proof methods validate and record the proof artifact and queue
    /// the order for administrative verification. Hosted methods record the
    /// pending attempt and hand off to the provider flow; no proof is asked
    /// for.
    pub async fn confirm_payment(
        &self,
        order_id: &OrderId,
        proof: Option<&str>,
    ) -> Result<ConfirmOutcome> {
        let lock = self.order_lock(order_id).await;
        let _guard = lock.lock().await;

        let session = self.session(order_id).await.ok_or_else(|| {
            VendError::SessionNotFound {
                order_id: order_id.to_string(),
            }
        })?;
        let order = self.orders.get(order_id).await?;
        if order.status != OrderStatus::PendingPayment {
            return Err(VendError::InvalidTransition {
                order_id: order_id.to_string(),
                from: order.status,
                to: OrderStatus::Processing,
            });
        }
        let method = self.registry.get(&session.method)?;

        if method.kind.requires_manual_proof() {
            let proof = proof.ok_or_else(|| VendError::MalformedProof {
                reason: "proof of payment is required".to_string(),
            })?;
            let proof = validate_proof(&method.kind, proof)?;

            let details = proof_details(&method.kind, &session.instructions, &proof);
            let tx = self
                .ledger
                .record(Transaction::new(
                    order.id.clone(),
                    order.buyer.clone(),
                    method.name.clone(),
                    order.amount,
                    TransactionKind::Payment,
                    details,
                    Actor::Buyer(order.buyer.clone()),
                ))
                .await?;

            self.orders
                .record_proof(order_id, proof.as_str(), None)
                .await?;
            self.orders
                .set_payment_status(order_id, PaymentStatus::Processing)
                .await?;
            self.set_stage(order_id, SessionStage::AwaitingVerification)
                .await;

            if let Err(e) = self
                .notifier
                .notify_admins(&format!(
                    "Payment proof submitted for order {} ({})",
                    order.order_number, method.name
                ))
                .await
            {
                warn!(order = %order_id, error = %e, "admin notification failed");
            }
            info!(order = %order_id, tx = %tx.id, "proof submitted, awaiting verification");
            Ok(ConfirmOutcome::AwaitingVerification(tx))
        } else {
            let tx = self
                .ledger
                .record(Transaction::new(
                    order.id.clone(),
                    order.buyer.clone(),
                    method.name.clone(),
                    order.amount,
                    TransactionKind::Payment,
                    TransactionDetails::default(),
                    Actor::Buyer(order.buyer.clone()),
                ))
                .await?;
            self.orders
                .set_payment_status(order_id, PaymentStatus::Processing)
                .await?;
            self.set_stage(order_id, SessionStage::HandedOff).await;
            info!(order = %order_id, tx = %tx.id, "handed off to hosted provider flow");
            Ok(ConfirmOutcome::HandOff(tx))
        }
    }

    /// Attach the provider-side transaction id created by the hosted flow,
    /// so the provider's webhook can correlate back.
    pub async fn register_hosted_session(
        &self,
        order_id: &OrderId,
        external_id: &str,
    ) -> Result<()> {
        let tx = self
            .ledger
            .transactions_for_order(order_id)
            .await
            .into_iter()
            .rev()
            .find(|t| t.kind == TransactionKind::Payment && !t.status.is_terminal())
            .ok_or_else(|| VendError::invalid_input("order", "no open payment attempt"))?;
        self.ledger.attach_external_id(&tx.id, external_id).await?;
        self.orders.record_external_tx(order_id, external_id).await
    }

    /// Administrative decision on submitted proof.
    ///
    /// Approval settles the payment transaction and moves the order to
    /// `Processing`; rejection fails the transaction and keeps the order in
    /// `PendingPayment` so the buyer can resubmit.
    pub async fn verify_manual_payment(
        &self,
        order_id: &OrderId,
        approve: bool,
        note: Option<String>,
        actor: Actor,
    ) -> Result<Order> {
        let authorized = match &actor {
            Actor::Admin(id) => self.admin_gate.is_admin(id).await,
            Actor::Buyer(_) | Actor::System => false,
        };
        if !authorized {
            return Err(VendError::Unauthorized {
                actor: actor.to_string(),
            });
        }

        let lock = self.order_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self.orders.get(order_id).await?;
        let tx = self
            .ledger
            .transactions_for_order(order_id)
            .await
            .into_iter()
            .rev()
            .find(|t| t.kind == TransactionKind::Payment && !t.status.is_terminal())
            .ok_or_else(|| VendError::invalid_input("order", "no submitted payment to verify"))?;

        if approve {
            self.ledger
                .advance(
                    &tx.id,
                    TransactionStatus::Completed,
                    note.unwrap_or_else(|| "approved by admin".to_string()),
                )
                .await?;
            self.orders
                .set_payment_status(order_id, PaymentStatus::Completed)
                .await?;
            let order = self
                .orders
                .update_status(
                    order_id,
                    OrderStatus::Processing,
                    "payment verified",
                    actor,
                )
                .await?;
            self.expiry.cancel(order_id).await;
            self.sessions.write().await.remove(order_id);
            info!(order = %order_id, tx = %tx.id, "manual payment approved");
            Ok(order)
        } else {
            let reason = note.unwrap_or_else(|| "rejected by admin".to_string());
            self.ledger
                .advance(&tx.id, TransactionStatus::Failed, reason.clone())
                .await?;
            self.orders
                .set_payment_status(order_id, PaymentStatus::Failed)
                .await?;
            self.set_stage(order_id, SessionStage::AwaitingPayment).await;
            if let Err(e) = self
                .notifier
                .notify_user(
                    &order.buyer,
                    &format!(
                        "Payment for order {} was rejected: {}. Please resubmit your proof.",
                        order.order_number, reason
                    ),
                )
                .await
            {
                warn!(order = %order_id, error = %e, "buyer notification failed");
            }
            info!(order = %order_id, tx = %tx.id, "manual payment rejected");
            self.orders.get(order_id).await
        }
    }

    /// Buyer- or system-initiated cancellation. Clears the session and the
    /// expiry entry.
    pub async fn cancel_payment(&self, order_id: &OrderId, actor: Actor) -> Result<Order> {
        let lock = self.order_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self
            .orders
            .update_status(order_id, OrderStatus::Cancelled, "payment cancelled", actor)
            .await?;
        self.expiry.cancel(order_id).await;
        self.sessions.write().await.remove(order_id);
        Ok(order)
    }

    /// Cancel every order whose expiry entry has fired, plus any order that
    /// sat in `PendingPayment` past the timeout with no entry at all (a
    /// timer lost to a restart). Returns how many orders were expired.
    pub async fn expire_stale_orders(&self) -> Result<usize> {
        let now = Utc::now();
        let mut due = self.expiry.due(now).await;

        for order in self
            .orders
            .pending_payment_older_than(now - self.config.payment_timeout)
            .await
        {
            if !due.contains(&order.id) && !self.expiry.contains(&order.id).await {
                due.push(order.id);
            }
        }

        let mut expired = 0;
        for order_id in due {
            let lock = self.order_lock(&order_id).await;
            let _guard = lock.lock().await;

            let order = match self.orders.get(&order_id).await {
                Ok(order) => order,
                Err(e) => {
                    warn!(order = %order_id, error = %e, "expiry entry for missing order");
                    self.expiry.cancel(&order_id).await;
                    continue;
                }
            };
            if order.status == OrderStatus::PendingPayment {
                self.orders
                    .update_status(
                        &order_id,
                        OrderStatus::Cancelled,
                        "payment expired",
                        Actor::System,
                    )
                    .await?;
                self.orders
                    .set_payment_status(&order_id, PaymentStatus::Failed)
                    .await?;
                expired += 1;
                info!(order = %order_id, "order expired");
            }
            // Orders that left PendingPayment before their entry was swept
            // just lose the stale entry; the status guard above makes a late
            // firing impossible.
            self.expiry.cancel(&order_id).await;
            self.sessions.write().await.remove(&order_id);
        }
        Ok(expired)
    }

    async fn set_stage(&self, order_id: &OrderId, stage: SessionStage) {
        if let Some(session) = self.sessions.write().await.get_mut(order_id) {
            session.stage = stage;
        }
    }
}

fn validate_proof(kind: &MethodKind, proof: &str) -> Result<String> {
    let trimmed = proof.trim();
    if trimmed.is_empty() {
        return Err(VendError::MalformedProof {
            reason: "proof is empty".to_string(),
        });
    }
    match kind {
        MethodKind::Crypto => {
            if trimmed.contains(char::is_whitespace) {
                return Err(VendError::MalformedProof {
                    reason: "a single transaction hash is expected".to_string(),
                });
            }
        }
        MethodKind::Voucher(_) => {
            if trimmed.len() < 4 {
                return Err(VendError::MalformedProof {
                    reason: "voucher code is too short".to_string(),
                });
            }
        }
        MethodKind::Manual | MethodKind::Hosted(_) => {}
    }
    Ok(trimmed.to_string())
}

fn proof_details(
    kind: &MethodKind,
    instructions: &PaymentInstructions,
    proof: &str,
) -> TransactionDetails {
    let mut details = TransactionDetails::default();
    match kind {
        MethodKind::Crypto => {
            if let PaymentInstructions::Crypto {
                network, address, ..
            } = instructions
            {
                details.network = Some(network.clone());
                details.wallet_address = Some(address.clone());
            }
            // The claimed hash doubles as the correlation key for the
            // explorer sweep.
            details.external_tx_id = Some(proof.to_string());
        }
        MethodKind::Voucher(_) => {
            details.voucher_code = Some(proof.to_string());
        }
        MethodKind::Manual | MethodKind::Hosted(_) => {}
    }
    details
}
