//! Normalized inbound settlement events
//!
//! Providers deliver webhooks in their own wire formats; the settlement
//! adapter parses them into these closed variants before anything touches
//! engine state. Delivery is at-least-once, so consumers must treat every
//! event as possibly replayed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Provider-reported outcome of a hosted payment or refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPaymentStatus {
    Succeeded,
    Pending,
    Failed,
}

/// One normalized settlement event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    /// Block confirmation callback for a crypto transfer
    CryptoConfirmation {
        /// Receiving address the buyer paid into
        address: String,
        /// On-chain transaction hash
        tx_hash: String,
        /// Confirmations observed so far
        confirmations: u32,
    },
    /// Hosted-provider payment callback
    HostedPayment {
        provider: String,
        /// Provider-side transaction id (correlation key)
        external_id: String,
        status: ProviderPaymentStatus,
        amount: Decimal,
    },
    /// Hosted-provider refund callback
    HostedRefund {
        provider: String,
        /// Provider-side id of the refund (correlation key)
        external_id: String,
        status: ProviderPaymentStatus,
    },
}

impl WebhookEvent {
    /// The settlement-specific key used to locate the matching transaction
    pub fn correlation_key(&self) -> &str {
        match self {
            Self::CryptoConfirmation { address, .. } => address,
            Self::HostedPayment { external_id, .. } => external_id,
            Self::HostedRefund { external_id, .. } => external_id,
        }
    }
}
