//! Error types for Vend
//!
//! One canonical error enum for the whole engine. Every failure that reaches
//! an orchestrator boundary leaves state at its last committed value;
//! variants here describe what was refused, not partial progress.

use crate::{OrderId, OrderStatus, TransactionId, TransactionStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for Vend operations
pub type Result<T> = std::result::Result<T, VendError>;

/// Vend error types
#[derive(Debug, Clone, Error)]
pub enum VendError {
    // ========================================================================
    // Checkout Errors
    // ========================================================================

    /// Checkout started from a cart with no items
    #[error("Cart is empty")]
    EmptyCart,

    /// No payment method qualifies for the amount
    #[error("No payment method available for amount {amount}")]
    NoMethodAvailable { amount: Decimal },

    /// No live checkout session for the order
    #[error("No active checkout session for order {order_id}")]
    SessionNotFound { order_id: String },

    /// Submitted proof does not match what the method expects
    #[error("Malformed payment proof: {reason}")]
    MalformedProof { reason: String },

    // ========================================================================
    // Order Errors
    // ========================================================================

    /// Order not found
    #[error("Order {order_id} not found")]
    OrderNotFound { order_id: String },

    /// Status machine refused the transition
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Recorded breakdown fails `total == subtotal + fees`
    #[error("Order {order_id} amount breakdown is inconsistent")]
    AmountMismatch { order_id: String },

    // ========================================================================
    // Payment Method Errors
    // ========================================================================

    /// Method not found in the registry
    #[error("Payment method {name} not found")]
    MethodNotFound { name: String },

    /// Amount falls outside the method's bounds
    #[error("Amount {amount} outside limits [{min}, {max}] for method {method}")]
    AmountOutsideLimits {
        method: String,
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Crypto method has no enabled network to receive on
    #[error("Payment method {method} has no enabled network")]
    NoEnabledNetwork { method: String },

    /// Method kind and configuration disagree; a configuration gap
    #[error("Unsupported payment method configuration for {method}: {detail}")]
    UnsupportedPaymentMethod { method: String, detail: String },

    // ========================================================================
    // Ledger Errors
    // ========================================================================

    /// Transaction not found
    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: String },

    /// Voucher code was already accepted by another transaction
    #[error("Voucher code has already been used")]
    VoucherAlreadyUsed { code: String },

    /// Transaction is terminal and accepts no further status changes
    #[error("Transaction {transaction_id} is already {status}")]
    TransactionAlreadyFinal {
        transaction_id: String,
        status: TransactionStatus,
    },

    // ========================================================================
    // Settlement Errors
    // ========================================================================

    /// External settlement provider call failed
    #[error("Settlement provider {provider} error: {message}")]
    ProviderError { provider: String, message: String },

    /// Refund larger than what the order charged
    #[error("Refund {requested} exceeds order total {total}")]
    RefundExceedsTotal { requested: Decimal, total: Decimal },

    /// Refund requires a completed payment transaction to reverse
    #[error("Order {order_id} has no completed payment transaction")]
    NoSettledPayment { order_id: String },

    // ========================================================================
    // Security Errors
    // ========================================================================

    /// Actor lacks administrative rights for the operation
    #[error("Unauthorized: {actor} may not perform this operation")]
    Unauthorized { actor: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VendError {
    /// Create an order-not-found error
    pub fn order_not_found(order_id: &OrderId) -> Self {
        Self::OrderNotFound {
            order_id: order_id.to_string(),
        }
    }

    /// Create a transaction-not-found error
    pub fn transaction_not_found(transaction_id: &TransactionId) -> Self {
        Self::TransactionNotFound {
            transaction_id: transaction_id.to_string(),
        }
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error describes a rejected input rather than a failure
    /// of the engine or a collaborator; no state changed for these.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyCart
                | Self::NoMethodAvailable { .. }
                | Self::MalformedProof { .. }
                | Self::AmountOutsideLimits { .. }
                | Self::RefundExceedsTotal { .. }
                | Self::VoucherAlreadyUsed { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "EMPTY_CART",
            Self::NoMethodAvailable { .. } => "NO_METHOD_AVAILABLE",
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::MalformedProof { .. } => "MALFORMED_PROOF",
            Self::OrderNotFound { .. } => "ORDER_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            Self::AmountOutsideLimits { .. } => "AMOUNT_OUTSIDE_LIMITS",
            Self::NoEnabledNetwork { .. } => "NO_ENABLED_NETWORK",
            Self::UnsupportedPaymentMethod { .. } => "UNSUPPORTED_PAYMENT_METHOD",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::VoucherAlreadyUsed { .. } => "VOUCHER_ALREADY_USED",
            Self::TransactionAlreadyFinal { .. } => "TRANSACTION_ALREADY_FINAL",
            Self::ProviderError { .. } => "PROVIDER_ERROR",
            Self::RefundExceedsTotal { .. } => "REFUND_EXCEEDS_TOTAL",
            Self::NoSettledPayment { .. } => "NO_SETTLED_PAYMENT",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
