//! Vend Ledger - Money-movement records for audit, limits, and correlation
//!
//! Every payment attempt and refund is one [`Transaction`] record, kept
//! independent of its order so multi-attempt payments and refunds stay
//! individually auditable. The ledger is:
//!
//! - Append-only: records gain status changes and history notes, nothing is
//!   rewritten retroactively
//! - The source for usage-limit accounting (completed payment volume)
//! - The correlation index for asynchronous settlement (wallet address,
//!   external transaction id)
//!
//! # Invariants
//!
//! 1. A voucher code is held by at most one non-failed transaction
//! 2. Terminal transactions accept no further status changes
//! 3. Every status change appends exactly one history note

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use vend_methods::SpendingHistory;
use vend_types::{
    OrderId, Result, Transaction, TransactionId, TransactionKind, TransactionStatus, UserId,
    VendError,
};

/// The Vend transaction ledger
///
/// Thread-safe, designed for concurrent access across orders.
#[derive(Clone)]
pub struct Ledger {
    /// All transactions by id
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    /// Order lookup index (insertion-ordered per order)
    by_order: Arc<RwLock<HashMap<OrderId, Vec<TransactionId>>>>,
}

impl Ledger {
    /// Create a new in-memory ledger
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            by_order: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a new transaction.
    ///
    /// Rejects a voucher code already held by any non-failed transaction
    /// (a failed attempt frees its code for resubmission). The check and the
    /// insert happen under one write lock so two submissions of the same
    /// code cannot both pass.
    pub async fn record(&self, tx: Transaction) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;

        if let Some(code) = &tx.details.voucher_code {
            let replayed = transactions
                .values()
                .any(|t| t.status != TransactionStatus::Failed
                    && t.details.voucher_code.as_deref() == Some(code.as_str()));
            if replayed {
                return Err(VendError::VoucherAlreadyUsed { code: code.clone() });
            }
        }

        let mut by_order = self.by_order.write().await;
        by_order
            .entry(tx.order_id.clone())
            .or_default()
            .push(tx.id.clone());
        info!(tx = %tx.id, order = %tx.order_id, kind = ?tx.kind, "transaction recorded");
        transactions.insert(tx.id.clone(), tx.clone());
        Ok(tx)
    }

    pub async fn get(&self, id: &TransactionId) -> Result<Transaction> {
        self.transactions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| VendError::transaction_not_found(id))
    }

    /// Advance a transaction's status, appending one history note.
    ///
    /// Terminal transactions refuse further changes; callers that tolerate
    /// replays (webhooks, sweeps) check for terminal status first.
    pub async fn advance(
        &self,
        id: &TransactionId,
        status: TransactionStatus,
        note: impl Into<String> + Send,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(id)
            .ok_or_else(|| VendError::transaction_not_found(id))?;
        if tx.status.is_terminal() {
            return Err(VendError::TransactionAlreadyFinal {
                transaction_id: id.to_string(),
                status: tx.status,
            });
        }
        tx.advance(status, note);
        info!(tx = %id, %status, "transaction advanced");
        Ok(tx.clone())
    }

    /// Append a history note without changing status.
    pub async fn annotate(&self, id: &TransactionId, note: impl Into<String> + Send) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(id)
            .ok_or_else(|| VendError::transaction_not_found(id))?;
        tx.annotate(note);
        Ok(())
    }

    /// Record the settlement source's transaction id. Write-once; later
    /// observations of a different id are kept as history notes by callers.
    pub async fn attach_external_id(
        &self,
        id: &TransactionId,
        external_tx_id: impl Into<String> + Send,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(id)
            .ok_or_else(|| VendError::transaction_not_found(id))?;
        if tx.details.external_tx_id.is_none() {
            tx.details.external_tx_id = Some(external_tx_id.into());
            tx.updated_at = Utc::now();
        }
        Ok(())
    }

    /// All transactions for an order, oldest first
    pub async fn transactions_for_order(&self, order_id: &OrderId) -> Vec<Transaction> {
        let ids = self
            .by_order
            .read()
            .await
            .get(order_id)
            .cloned()
            .unwrap_or_default();
        let transactions = self.transactions.read().await;
        ids.iter()
            .filter_map(|id| transactions.get(id).cloned())
            .collect()
    }

    /// The completed payment transaction for an order, if any
    pub async fn settled_payment_for_order(&self, order_id: &OrderId) -> Option<Transaction> {
        self.transactions_for_order(order_id)
            .await
            .into_iter()
            .find(|t| {
                t.kind == TransactionKind::Payment && t.status == TransactionStatus::Completed
            })
    }

    /// Pending payment transaction receiving on `address` (crypto correlation)
    pub async fn find_pending_by_wallet_address(&self, address: &str) -> Option<Transaction> {
        self.transactions
            .read()
            .await
            .values()
            .find(|t| {
                t.kind == TransactionKind::Payment
                    && t.status == TransactionStatus::Pending
                    && t.details.wallet_address.as_deref() == Some(address)
            })
            .cloned()
    }

    /// Transaction correlated to an external settlement id
    pub async fn find_by_external_id(&self, external_id: &str) -> Option<Transaction> {
        self.transactions
            .read()
            .await
            .values()
            .find(|t| t.details.external_tx_id.as_deref() == Some(external_id))
            .cloned()
    }

    /// Every transaction on record, oldest first, for audit export
    pub async fn export(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> = self.transactions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Non-terminal transactions created more than `age` ago, for the
    /// reconciliation sweep
    pub async fn pending_older_than(&self, age: Duration) -> Vec<Transaction> {
        let cutoff = Utc::now() - age;
        self.transactions
            .read()
            .await
            .values()
            .filter(|t| t.status == TransactionStatus::Pending && t.created_at < cutoff)
            .cloned()
            .collect()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpendingHistory for Ledger {
    /// Sum of completed payment totals for limit accounting. Completion time
    /// is approximated by `updated_at`, which a terminal transaction gained
    /// at its final advance.
    async fn completed_payment_volume(
        &self,
        method: &str,
        since: DateTime<Utc>,
        user: Option<&UserId>,
    ) -> Decimal {
        self.transactions
            .read()
            .await
            .values()
            .filter(|t| {
                t.kind == TransactionKind::Payment
                    && t.status == TransactionStatus::Completed
                    && t.method == method
                    && t.updated_at >= since
                    && user.map_or(true, |u| &t.user_id == u)
            })
            .map(|t| t.amount.total)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vend_types::{Actor, AmountBreakdown, TransactionDetails};

    fn payment_tx(order_id: OrderId, user: &str, voucher: Option<&str>) -> Transaction {
        Transaction::new(
            order_id,
            UserId::new(user),
            "psc-voucher",
            AmountBreakdown::new(dec!(50), dec!(1)),
            TransactionKind::Payment,
            TransactionDetails {
                voucher_code: voucher.map(str::to_string),
                ..Default::default()
            },
            Actor::Buyer(UserId::new(user)),
        )
    }

    #[tokio::test]
    async fn test_voucher_replay_is_rejected() {
        let ledger = Ledger::new();
        ledger
            .record(payment_tx(OrderId::new(), "u1", Some("CODE-1")))
            .await
            .unwrap();

        let err = ledger
            .record(payment_tx(OrderId::new(), "u2", Some("CODE-1")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VOUCHER_ALREADY_USED");
    }

    #[tokio::test]
    async fn test_failed_attempt_frees_its_voucher_code() {
        let ledger = Ledger::new();
        let tx = ledger
            .record(payment_tx(OrderId::new(), "u1", Some("CODE-1")))
            .await
            .unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Failed, "rejected by admin")
            .await
            .unwrap();

        assert!(ledger
            .record(payment_tx(OrderId::new(), "u1", Some("CODE-1")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_terminal_transaction_refuses_advance() {
        let ledger = Ledger::new();
        let tx = ledger
            .record(payment_tx(OrderId::new(), "u1", None))
            .await
            .unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Completed, "settled")
            .await
            .unwrap();

        let err = ledger
            .advance(&tx.id, TransactionStatus::Failed, "late failure")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRANSACTION_ALREADY_FINAL");
    }

    #[tokio::test]
    async fn test_completed_volume_scopes_method_user_and_status() {
        let ledger = Ledger::new();
        let order = OrderId::new();
        let completed = ledger.record(payment_tx(order.clone(), "u1", None)).await.unwrap();
        ledger
            .advance(&completed.id, TransactionStatus::Completed, "settled")
            .await
            .unwrap();
        // Still pending; must not count
        ledger
            .record(payment_tx(OrderId::new(), "u1", None))
            .await
            .unwrap();

        let since = Utc::now() - Duration::days(1);
        let all = ledger
            .completed_payment_volume("psc-voucher", since, None)
            .await;
        assert_eq!(all, dec!(51));

        let other_user = ledger
            .completed_payment_volume("psc-voucher", since, Some(&UserId::new("u2")))
            .await;
        assert_eq!(other_user, Decimal::ZERO);

        let other_method = ledger
            .completed_payment_volume("btc-transfer", since, None)
            .await;
        assert_eq!(other_method, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_wallet_address_correlation_finds_only_pending() {
        let ledger = Ledger::new();
        let mut tx = payment_tx(OrderId::new(), "u1", None);
        tx.details.wallet_address = Some("bc1qlive".to_string());
        let tx = ledger.record(tx).await.unwrap();

        assert_eq!(
            ledger
                .find_pending_by_wallet_address("bc1qlive")
                .await
                .unwrap()
                .id,
            tx.id
        );

        ledger
            .advance(&tx.id, TransactionStatus::Completed, "confirmed")
            .await
            .unwrap();
        assert!(ledger.find_pending_by_wallet_address("bc1qlive").await.is_none());
    }

    #[tokio::test]
    async fn test_external_id_is_write_once() {
        let ledger = Ledger::new();
        let tx = ledger
            .record(payment_tx(OrderId::new(), "u1", None))
            .await
            .unwrap();
        ledger.attach_external_id(&tx.id, "hash123").await.unwrap();
        ledger.attach_external_id(&tx.id, "hash456").await.unwrap();

        let got = ledger.get(&tx.id).await.unwrap();
        assert_eq!(got.details.external_tx_id.as_deref(), Some("hash123"));
        assert_eq!(ledger.find_by_external_id("hash123").await.unwrap().id, tx.id);
    }

    #[tokio::test]
    async fn test_export_is_oldest_first_and_complete() {
        let ledger = Ledger::new();
        let first = ledger.record(payment_tx(OrderId::new(), "u1", None)).await.unwrap();
        let second = ledger.record(payment_tx(OrderId::new(), "u2", None)).await.unwrap();

        let all = ledger.export().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }

    #[tokio::test]
    async fn test_order_index_keeps_insertion_order() {
        let ledger = Ledger::new();
        let order = OrderId::new();
        let first = ledger.record(payment_tx(order.clone(), "u1", None)).await.unwrap();
        let second = ledger.record(payment_tx(order.clone(), "u1", None)).await.unwrap();

        let txs = ledger.transactions_for_order(&order).await;
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].id, first.id);
        assert_eq!(txs[1].id, second.id);
    }
}
