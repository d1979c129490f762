//! Order types for Vend
//!
//! An order is one purchase attempt: snapshotted line items, a payment block,
//! and a timeline that records every status change. Orders are mutated only
//! through the status-transition operation in `vend-orders`, never by direct
//! field writes, so the timeline stays authoritative.

use crate::{Actor, AmountBreakdown, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, method not yet selected
    Created,
    /// Instructions issued, waiting for payment
    PendingPayment,
    /// Payment verified, fulfillment in progress
    Processing,
    /// All items fulfilled (terminal)
    Completed,
    /// Cancelled by buyer, admin, or expiry (terminal)
    Cancelled,
    /// Refund executed (terminal)
    Refunded,
}

impl OrderStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }

    /// Check whether the machine permits moving from `self` to `next`.
    ///
    /// Cancelled and Refunded are reachable from every non-terminal state;
    /// the forward path is Created -> PendingPayment -> Processing ->
    /// Completed. Re-entering the current state is handled upstream as a
    /// no-op, not as a transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Cancelled | OrderStatus::Refunded => true,
            OrderStatus::PendingPayment => *self == OrderStatus::Created,
            OrderStatus::Processing => *self == OrderStatus::PendingPayment,
            OrderStatus::Completed => *self == OrderStatus::Processing,
            OrderStatus::Created => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::PendingPayment => "pending_payment",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        write!(f, "{}", s)
    }
}

/// Status of the payment block on an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

/// How a line item is delivered once paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Delivered automatically on payment (keys, files, codes)
    Instant,
    /// Fulfilled by an operator
    Manual,
}

/// Per-item fulfillment progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Delivered,
}

/// One purchased product, priced at order time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    /// Product title snapshotted for display
    pub title: String,
    pub quantity: u32,
    /// Unit price at the time the order was created
    pub unit_price: Decimal,
    /// Buyer answers to product custom fields, in prompt order
    pub custom_fields: Vec<(String, String)>,
    pub delivery: DeliveryMode,
    pub fulfillment: FulfillmentStatus,
    /// Content handed to the buyer on delivery
    pub delivered_content: Option<String>,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Settlement evidence attached to the payment block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementDetails {
    /// Transaction id at the external settlement source
    pub external_tx_id: Option<String>,
    /// Buyer-submitted proof (hash, code, receipt text)
    pub proof: Option<String>,
    /// Method-generated reference the buyer quotes back
    pub verification_code: Option<String>,
}

/// One entry in the order timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub note: String,
    pub actor: Actor,
}

/// An order in Vend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Internal id
    pub id: OrderId,
    /// Human-readable number, immutable once assigned
    pub order_number: String,
    pub buyer: UserId,
    pub contact: Option<String>,
    pub items: Vec<LineItem>,
    /// Name of the chosen payment method
    pub method: String,
    pub payment_status: PaymentStatus,
    /// Charge snapshot; the source of truth for what was charged
    pub amount: AmountBreakdown,
    pub settlement: SettlementDetails,
    pub status: OrderStatus,
    pub timeline: Vec<TimelineEntry>,
    pub admin_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of line totals, recomputed from the snapshot
    pub fn items_subtotal(&self) -> Decimal {
        self.items.iter().map(|i| i.line_total()).sum()
    }

    /// Check if every line item has been delivered
    pub fn fully_delivered(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| i.fulfillment == FulfillmentStatus::Delivered)
    }

    /// When the order last entered `PendingPayment`, from the timeline
    pub fn pending_payment_since(&self) -> Option<DateTime<Utc>> {
        self.timeline
            .iter()
            .rev()
            .find(|e| e.status == OrderStatus::PendingPayment)
            .map(|e| e.at)
    }

    /// Record a committed status change: set the status and append exactly
    /// one timeline entry. Transition validity and side effects are the
    /// store's responsibility; this only keeps the record shape consistent.
    pub fn record_status(&mut self, status: OrderStatus, note: impl Into<String>, actor: Actor) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.timeline.push(TimelineEntry {
            status,
            at: now,
            note: note.into(),
            actor,
        });
    }
}
