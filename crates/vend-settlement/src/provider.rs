//! Settlement provider and explorer ports
//!
//! One adapter per hosted provider, plus a read-only explorer seam for
//! confirming on-chain transfers. Refund creation moves money and is never
//! silently retried; status retrieval is read-only and safe to poll.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use vend_methods::HostedProvider;
use vend_types::{ProviderPaymentStatus, Result, VendError};

/// Adapter for one hosted settlement provider
#[async_trait::async_trait]
pub trait SettlementProvider: Send + Sync {
    /// Create a refund of `amount` against the provider-side transaction.
    /// Returns the provider's id for the refund.
    async fn create_refund(&self, original_tx_id: &str, amount: Decimal) -> Result<String>;

    /// Current provider-side status of a payment or refund
    async fn retrieve_status(&self, external_id: &str) -> Result<ProviderPaymentStatus>;
}

/// Read-only blockchain explorer seam
#[async_trait::async_trait]
pub trait ChainExplorer: Send + Sync {
    /// Confirmations observed for a transaction hash
    async fn confirmations(&self, tx_hash: &str) -> Result<u32>;
}

/// Registered provider adapters, keyed by the closed provider set
pub type ProviderMap = HashMap<HostedProvider, Arc<dyn SettlementProvider>>;

/// In-memory provider used by tests and local runs.
///
/// Statuses are seeded per external id; refunds succeed unless the adapter
/// was constructed failing.
pub struct SimulatedProvider {
    name: &'static str,
    statuses: RwLock<HashMap<String, ProviderPaymentStatus>>,
    refunds_fail_with: Option<String>,
    refund_counter: RwLock<u64>,
}

impl SimulatedProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            statuses: RwLock::new(HashMap::new()),
            refunds_fail_with: None,
            refund_counter: RwLock::new(0),
        }
    }

    /// Provider whose refund API always fails with `message`
    pub fn failing_refunds(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            refunds_fail_with: Some(message.into()),
            ..Self::new(name)
        }
    }

    pub async fn set_status(&self, external_id: impl Into<String>, status: ProviderPaymentStatus) {
        self.statuses.write().await.insert(external_id.into(), status);
    }
}

#[async_trait::async_trait]
impl SettlementProvider for SimulatedProvider {
    async fn create_refund(&self, original_tx_id: &str, _amount: Decimal) -> Result<String> {
        if let Some(message) = &self.refunds_fail_with {
            return Err(VendError::provider(self.name, message.clone()));
        }
        let mut counter = self.refund_counter.write().await;
        *counter += 1;
        Ok(format!("re_{}_{}", original_tx_id, counter))
    }

    async fn retrieve_status(&self, external_id: &str) -> Result<ProviderPaymentStatus> {
        self.statuses
            .read()
            .await
            .get(external_id)
            .copied()
            .ok_or_else(|| {
                VendError::provider(self.name, format!("unknown transaction {}", external_id))
            })
    }
}
