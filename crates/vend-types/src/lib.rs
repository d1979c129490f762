//! Vend Types - Canonical domain types for the payment & order engine
//!
//! This crate contains all foundational types for Vend with zero dependencies
//! on other vend crates. It defines the type system for:
//!
//! - Identity types (OrderId, TransactionId, UserId, ProductId)
//! - Amount breakdowns with decimal precision
//! - Order aggregate types and the order status machine vocabulary
//! - Ledger transaction types with append-only history
//! - Normalized inbound settlement events
//!
//! # Invariants carried by these types
//!
//! 1. `AmountBreakdown::total` always equals `subtotal + fees`
//! 2. Order status changes append exactly one timeline entry
//! 3. Transaction history is append-only
//! 4. Terminal statuses accept no further transitions

pub mod amount;
pub mod error;
pub mod identity;
pub mod order;
pub mod transaction;
pub mod webhook;

pub use amount::*;
pub use error::*;
pub use identity::*;
pub use order::*;
pub use transaction::*;
pub use webhook::*;
