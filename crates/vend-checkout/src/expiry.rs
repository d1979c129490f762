//! Durable expiration schedule
//!
//! One entry per order: when its unpaid checkout should expire. The sweep
//! reads due entries; cancelling a checkout (or approving its payment)
//! deletes the entry, so an expiry can never fire after the order has left
//! `PendingPayment`. Re-scheduling an order replaces its entry, which is
//! what cancels the prior timer when a buyer re-selects a method.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use vend_types::OrderId;

/// Persisted fires-at map, keyed by order id
#[derive(Clone, Default)]
pub struct ExpirySchedule {
    entries: Arc<RwLock<HashMap<OrderId, DateTime<Utc>>>>,
}

impl ExpirySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the expiry for an order.
    pub async fn schedule(&self, order_id: OrderId, fires_at: DateTime<Utc>) {
        debug!(order = %order_id, %fires_at, "expiry scheduled");
        self.entries.write().await.insert(order_id, fires_at);
    }

    /// Deterministically cancel an order's expiry. Safe to call when no
    /// entry exists.
    pub async fn cancel(&self, order_id: &OrderId) {
        if self.entries.write().await.remove(order_id).is_some() {
            debug!(order = %order_id, "expiry cancelled");
        }
    }

    pub async fn contains(&self, order_id: &OrderId) -> bool {
        self.entries.read().await.contains_key(order_id)
    }

    pub async fn fires_at(&self, order_id: &OrderId) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(order_id).copied()
    }

    /// Orders whose entry has fired as of `now`
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, fires_at)| **fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
