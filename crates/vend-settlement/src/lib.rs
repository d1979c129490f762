//! Vend Settlement - Heterogeneous settlement backends
//!
//! This crate holds everything that talks to (or stands in for) the parties
//! that actually move funds: hosted provider adapters, blockchain explorers,
//! the refund executor that dispatches across them, and the webhook adapter
//! that normalizes their asynchronous callbacks into ledger and order state.

pub mod provider;
pub mod refund;
pub mod webhook;

pub use provider::{ChainExplorer, ProviderMap, SettlementProvider, SimulatedProvider};
pub use refund::RefundExecutor;
pub use webhook::WebhookAdapter;
