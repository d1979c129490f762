//! Payment method entity
//!
//! The settlement channel set is closed: adding a vendor or provider means
//! adding a variant, and every dispatch site match is checked exhaustively
//! by the compiler.

use crate::fees::FeeSchedule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Voucher vendors sharing the code-based flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherVendor {
    Paysafe,
    AmazonGift,
    GooglePlay,
}

impl VoucherVendor {
    /// Short code used in generated payment references
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            Self::Paysafe => "PSC",
            Self::AmazonGift => "AMZ",
            Self::GooglePlay => "GPC",
        }
    }
}

impl std::fmt::Display for VoucherVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Paysafe => "paysafe",
            Self::AmazonGift => "amazon_gift",
            Self::GooglePlay => "google_play",
        };
        write!(f, "{}", s)
    }
}

/// Hosted checkout providers with client-side redirect flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostedProvider {
    Stripe,
    Paypal,
}

impl std::fmt::Display for HostedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
        };
        write!(f, "{}", s)
    }
}

/// Kind of settlement channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Peer-to-peer transfer on a blockchain network
    Crypto,
    /// Prepaid code redeemed by an operator
    Voucher(VoucherVendor),
    /// Hosted card/wallet checkout with automatic settlement
    Hosted(HostedProvider),
    /// Fully manual settlement
    Manual,
}

impl MethodKind {
    /// Whether the buyer must submit proof for operator verification
    pub fn requires_manual_proof(&self) -> bool {
        matches!(self, Self::Crypto | Self::Voucher(_) | Self::Manual)
    }

    /// Whether settlement completes automatically at a hosted provider
    pub fn is_hosted(&self) -> bool {
        matches!(self, Self::Hosted(_))
    }
}

/// Administrative status of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodStatus {
    /// Offered to buyers
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

/// Amount bounds and usage limits for one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Completed-payment volume allowed per rolling day, method-wide
    pub daily_limit: Option<Decimal>,
    /// Completed-payment volume allowed per rolling month, method-wide
    pub monthly_limit: Option<Decimal>,
    /// Completed-payment volume allowed per buyer per rolling month
    pub per_user_limit: Option<Decimal>,
}

impl Limits {
    pub fn bounds(min_amount: Decimal, max_amount: Decimal) -> Self {
        Self {
            min_amount,
            max_amount,
            daily_limit: None,
            monthly_limit: None,
            per_user_limit: None,
        }
    }

    /// `min_amount <= max_amount` must hold for a usable method
    pub fn is_valid(&self) -> bool {
        self.min_amount <= self.max_amount
    }
}

/// One receiving network for a crypto method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoNetwork {
    /// Network name shown to the buyer (e.g. "BTC", "TRC20")
    pub network: String,
    /// Receiving address buyers pay into
    pub address: String,
    pub enabled: bool,
    /// Confirmations required before the payment counts as settled
    pub required_confirmations: u32,
}

/// Kind-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodConfig {
    Crypto {
        networks: Vec<CryptoNetwork>,
    },
    Voucher {
        /// How to buy and submit the code
        instructions: String,
        contact: String,
    },
    Hosted {
        /// Public client/publishable key; secret credentials live elsewhere
        publishable_key: String,
    },
    Manual {
        instructions: String,
        /// What happens between proof submission and approval
        verification_process: String,
        contact: String,
    },
}

/// Configuration for one settlement channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Unique name, the reference orders and transactions carry
    pub name: String,
    pub kind: MethodKind,
    pub fees: FeeSchedule,
    pub limits: Limits,
    pub status: MethodStatus,
    pub config: MethodConfig,
    /// Ascending sort key for buyer-facing listings
    pub display_order: u32,
}

impl PaymentMethod {
    /// Whether the kind and its configuration agree. A mismatch is a
    /// configuration gap surfaced as `UnsupportedPaymentMethod` at use sites.
    pub fn config_matches_kind(&self) -> bool {
        matches!(
            (&self.kind, &self.config),
            (MethodKind::Crypto, MethodConfig::Crypto { .. })
                | (MethodKind::Voucher(_), MethodConfig::Voucher { .. })
                | (MethodKind::Hosted(_), MethodConfig::Hosted { .. })
                | (MethodKind::Manual, MethodConfig::Manual { .. })
        )
    }

    /// First enabled network of a crypto method
    pub fn first_enabled_network(&self) -> Option<&CryptoNetwork> {
        match &self.config {
            MethodConfig::Crypto { networks } => networks.iter().find(|n| n.enabled),
            _ => None,
        }
    }

    /// Required confirmations for a receiving address, when this method
    /// owns it
    pub fn confirmations_for_address(&self, address: &str) -> Option<u32> {
        match &self.config {
            MethodConfig::Crypto { networks } => networks
                .iter()
                .find(|n| n.address == address)
                .map(|n| n.required_confirmations),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn crypto_method() -> PaymentMethod {
        PaymentMethod {
            name: "btc-transfer".to_string(),
            kind: MethodKind::Crypto,
            fees: FeeSchedule::free(),
            limits: Limits::bounds(dec!(10), dec!(500)),
            status: MethodStatus::Active,
            config: MethodConfig::Crypto {
                networks: vec![
                    CryptoNetwork {
                        network: "BTC".to_string(),
                        address: "bc1qdisabled".to_string(),
                        enabled: false,
                        required_confirmations: 3,
                    },
                    CryptoNetwork {
                        network: "BTC".to_string(),
                        address: "bc1qlive".to_string(),
                        enabled: true,
                        required_confirmations: 3,
                    },
                ],
            },
            display_order: 1,
        }
    }

    #[test]
    fn test_first_enabled_network_skips_disabled() {
        let method = crypto_method();
        assert_eq!(method.first_enabled_network().unwrap().address, "bc1qlive");
    }

    #[test]
    fn test_config_kind_mismatch_detected() {
        let mut method = crypto_method();
        method.config = MethodConfig::Manual {
            instructions: String::new(),
            verification_process: String::new(),
            contact: String::new(),
        };
        assert!(!method.config_matches_kind());
    }

    #[test]
    fn test_proof_requirement_by_kind() {
        assert!(MethodKind::Crypto.requires_manual_proof());
        assert!(MethodKind::Voucher(VoucherVendor::Paysafe).requires_manual_proof());
        assert!(MethodKind::Manual.requires_manual_proof());
        assert!(!MethodKind::Hosted(HostedProvider::Stripe).requires_manual_proof());
    }

    #[test]
    fn test_limit_bounds_validity() {
        assert!(Limits::bounds(dec!(10), dec!(500)).is_valid());
        assert!(!Limits::bounds(dec!(500), dec!(10)).is_valid());
    }
}
