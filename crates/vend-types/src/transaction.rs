//! Ledger transaction types for Vend
//!
//! A transaction is one money-movement record, kept independent of its order
//! so refunds and repeated payment attempts stay individually auditable.
//! Records are append-only: status advances through [`Transaction::advance`],
//! which appends a history note; nothing else is rewritten after creation.

use crate::{Actor, AmountBreakdown, OrderId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Refund,
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, waiting for settlement evidence
    Pending,
    /// Settlement in flight at the external source
    Processing,
    /// Settled (terminal)
    Completed,
    /// Settlement failed or rejected (terminal)
    Failed,
}

impl TransactionStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Settlement-specific fields; which are set depends on the method kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    /// Receiving wallet address (crypto)
    pub wallet_address: Option<String>,
    /// Network the transfer rides on (crypto)
    pub network: Option<String>,
    /// Transaction id at the external settlement source
    pub external_tx_id: Option<String>,
    /// Voucher code submitted as proof (voucher methods)
    pub voucher_code: Option<String>,
    /// Reason recorded on refund transactions
    pub refund_reason: Option<String>,
    /// Original payment this refund reverses
    pub original_tx: Option<TransactionId>,
}

/// One append-only note in the transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryNote {
    pub at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub note: String,
}

/// One money-movement record in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Name of the payment method used
    pub method: String,
    pub amount: AmountBreakdown,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub details: TransactionDetails,
    pub initiated_by: Actor,
    pub history: Vec<HistoryNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction in `Pending` with an opening history note.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        method: impl Into<String>,
        amount: AmountBreakdown,
        kind: TransactionKind,
        details: TransactionDetails,
        initiated_by: Actor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            order_id,
            user_id,
            method: method.into(),
            amount,
            kind,
            status: TransactionStatus::Pending,
            details,
            initiated_by,
            history: vec![HistoryNote {
                at: now,
                status: TransactionStatus::Pending,
                note: "created".to_string(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status and append one history note.
    pub fn advance(&mut self, status: TransactionStatus, note: impl Into<String>) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.history.push(HistoryNote {
            at: now,
            status,
            note: note.into(),
        });
    }

    /// Append a note without changing status (e.g. an observed confirmation
    /// count that is still below threshold).
    pub fn annotate(&mut self, note: impl Into<String>) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(HistoryNote {
            at: now,
            status: self.status,
            note: note.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Transaction {
        Transaction::new(
            OrderId::new(),
            UserId::new("u1"),
            "btc-transfer",
            AmountBreakdown::new(dec!(40), dec!(2)),
            TransactionKind::Payment,
            TransactionDetails::default(),
            Actor::Buyer(UserId::new("u1")),
        )
    }

    #[test]
    fn test_new_transaction_opens_history() {
        let tx = sample();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.history.len(), 1);
    }

    #[test]
    fn test_advance_appends_exactly_one_note() {
        let mut tx = sample();
        tx.advance(TransactionStatus::Completed, "admin approved");
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.history.len(), 2);
        assert_eq!(tx.history.last().unwrap().note, "admin approved");
    }

    #[test]
    fn test_annotate_keeps_status() {
        let mut tx = sample();
        tx.annotate("2 of 3 confirmations");
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.history.len(), 2);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }
}
