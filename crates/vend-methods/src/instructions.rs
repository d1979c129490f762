//! Payment instruction generation
//!
//! Turns a selected method and charge into the payload the buyer follows:
//! a receiving address, a voucher reference, manual steps, or a hosted
//! redirect. References embed the order number so operator-side matching of
//! proof to order never depends on free-text.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use vend_types::{OrderId, Result, VendError};

use crate::method::{HostedProvider, MethodConfig, MethodKind, PaymentMethod, VoucherVendor};

/// Type-tagged instruction payload handed to the buyer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentInstructions {
    Crypto {
        network: String,
        address: String,
        confirmations_required: u32,
        /// URI payload for QR rendering by the presentation layer
        qr_payload: String,
    },
    Voucher {
        vendor: VoucherVendor,
        instructions: String,
        contact: String,
        reference: String,
    },
    Manual {
        instructions: String,
        verification_process: String,
        contact: String,
        reference: String,
    },
    Hosted {
        provider: HostedProvider,
        publishable_key: String,
        amount: Decimal,
        order_id: OrderId,
    },
}

impl PaymentInstructions {
    /// The reference the buyer quotes back with their proof, when the flow
    /// uses one
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Voucher { reference, .. } | Self::Manual { reference, .. } => Some(reference),
            Self::Crypto { .. } | Self::Hosted { .. } => None,
        }
    }
}

/// QR rendering collaborator for crypto addresses. Pure: same payload, same
/// bytes.
pub trait QrRenderer: Send + Sync {
    fn render_qr(&self, payload: &str) -> Vec<u8>;
}

/// URI payload encoded into the QR for a crypto payment
pub fn crypto_qr_payload(network: &str, address: &str, amount: Decimal) -> String {
    format!(
        "{}:{}?amount={}",
        network.to_lowercase(),
        address,
        amount
    )
}

fn random8hex() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

/// Produce the instruction payload for a selected method.
///
/// A method whose configuration does not match its kind signals
/// `UnsupportedPaymentMethod`; that is a configuration gap, logged at error
/// level because buyers were offered a method nobody can settle.
pub fn payment_instructions(
    method: &PaymentMethod,
    amount: Decimal,
    order_id: &OrderId,
    order_number: &str,
) -> Result<PaymentInstructions> {
    match (&method.kind, &method.config) {
        (MethodKind::Crypto, MethodConfig::Crypto { .. }) => {
            let network =
                method
                    .first_enabled_network()
                    .ok_or_else(|| VendError::NoEnabledNetwork {
                        method: method.name.clone(),
                    })?;
            Ok(PaymentInstructions::Crypto {
                network: network.network.clone(),
                address: network.address.clone(),
                confirmations_required: network.required_confirmations,
                qr_payload: crypto_qr_payload(&network.network, &network.address, amount),
            })
        }
        (
            MethodKind::Voucher(vendor),
            MethodConfig::Voucher {
                instructions,
                contact,
            },
        ) => Ok(PaymentInstructions::Voucher {
            vendor: *vendor,
            instructions: instructions.clone(),
            contact: contact.clone(),
            reference: format!(
                "{}-{}-{}",
                vendor.reference_prefix(),
                order_number,
                random8hex()
            ),
        }),
        (
            MethodKind::Manual,
            MethodConfig::Manual {
                instructions,
                verification_process,
                contact,
            },
        ) => Ok(PaymentInstructions::Manual {
            instructions: instructions.clone(),
            verification_process: verification_process.clone(),
            contact: contact.clone(),
            reference: format!("MAN-{}-{}", order_number, random8hex()),
        }),
        (MethodKind::Hosted(provider), MethodConfig::Hosted { publishable_key }) => {
            Ok(PaymentInstructions::Hosted {
                provider: *provider,
                publishable_key: publishable_key.clone(),
                amount,
                order_id: order_id.clone(),
            })
        }
        _ => {
            error!(
                method = %method.name,
                "method kind and configuration disagree; cannot generate instructions"
            );
            Err(VendError::UnsupportedPaymentMethod {
                method: method.name.clone(),
                detail: "configuration does not match method kind".to_string(),
            })
        }
    }
}
