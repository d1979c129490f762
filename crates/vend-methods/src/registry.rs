//! Payment method registry
//!
//! Methods are configured by an administrative collaborator and read-only
//! here apart from usage-limit queries. Availability filtering combines the
//! method's own status and bounds with completed-payment volume read from
//! the ledger through [`SpendingHistory`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::warn;

use vend_types::{Result, UserId, VendError};

use crate::method::{MethodStatus, PaymentMethod};

/// Ledger seam for limit accounting.
///
/// Implementations sum the `total` of Completed payment transactions for a
/// method since `since`, scoped to one buyer when `user` is given.
#[async_trait::async_trait]
pub trait SpendingHistory: Send + Sync {
    async fn completed_payment_volume(
        &self,
        method: &str,
        since: DateTime<Utc>,
        user: Option<&UserId>,
    ) -> Decimal;
}

/// Registry of configured settlement methods
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, PaymentMethod>>,
    history: Arc<dyn SpendingHistory>,
}

impl MethodRegistry {
    pub fn new(history: Arc<dyn SpendingHistory>) -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
            history,
        }
    }

    /// Insert or replace a method configuration.
    pub fn upsert(&self, method: PaymentMethod) -> Result<()> {
        if !method.limits.is_valid() {
            return Err(VendError::invalid_input(
                "limits",
                format!(
                    "min_amount {} exceeds max_amount {}",
                    method.limits.min_amount, method.limits.max_amount
                ),
            ));
        }
        if !method.config_matches_kind() {
            return Err(VendError::UnsupportedPaymentMethod {
                method: method.name.clone(),
                detail: "configuration does not match method kind".to_string(),
            });
        }
        self.methods.write().insert(method.name.clone(), method);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<PaymentMethod> {
        self.methods.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Result<PaymentMethod> {
        self.methods
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VendError::MethodNotFound {
                name: name.to_string(),
            })
    }

    pub fn all(&self) -> Vec<PaymentMethod> {
        self.methods.read().values().cloned().collect()
    }

    /// Whether `method` can take a payment of `amount` right now.
    ///
    /// Limit sums are read without any lock spanning the checkout; a race
    /// between two checkouts near a boundary is tolerated (reconciled by
    /// admin review), per the engine's concurrency contract.
    pub async fn is_available(
        &self,
        method: &PaymentMethod,
        amount: Decimal,
        user: Option<&UserId>,
    ) -> bool {
        if method.status != MethodStatus::Active {
            return false;
        }
        if amount < method.limits.min_amount || amount > method.limits.max_amount {
            return false;
        }

        let now = Utc::now();
        if let Some(daily) = method.limits.daily_limit {
            let used = self
                .history
                .completed_payment_volume(&method.name, now - Duration::days(1), None)
                .await;
            if used + amount > daily {
                warn!(method = %method.name, %used, %amount, "daily limit would be exceeded");
                return false;
            }
        }
        if let Some(monthly) = method.limits.monthly_limit {
            let used = self
                .history
                .completed_payment_volume(&method.name, now - Duration::days(30), None)
                .await;
            if used + amount > monthly {
                warn!(method = %method.name, %used, %amount, "monthly limit would be exceeded");
                return false;
            }
        }
        if let (Some(per_user), Some(user)) = (method.limits.per_user_limit, user) {
            let used = self
                .history
                .completed_payment_volume(&method.name, now - Duration::days(30), Some(user))
                .await;
            if used + amount > per_user {
                warn!(method = %method.name, %user, %used, %amount, "per-user limit would be exceeded");
                return false;
            }
        }
        true
    }

    /// Methods a buyer may pick for `amount`, display order ascending.
    pub async fn available_methods(
        &self,
        amount: Decimal,
        user: Option<&UserId>,
    ) -> Vec<PaymentMethod> {
        let candidates: Vec<PaymentMethod> = self.methods.read().values().cloned().collect();

        let mut available = Vec::new();
        for method in candidates {
            if self.is_available(&method, amount, user).await {
                available.push(method);
            }
        }
        available.sort_by_key(|m| m.display_order);
        available
    }
}
