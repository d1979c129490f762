//! Vend Checkout - From priced cart to tracked order
//!
//! The orchestrator is the stateful coordinator of the engine: it creates
//! orders from carts, drives method selection, issues instructions, takes
//! proof submissions, invokes admin verification, and owns the expiration
//! schedule for unpaid orders.
//!
//! All mutations to one order are serialized through a per-order lock;
//! operations on different orders run fully concurrently. Expiration is not
//! a per-process delayed callback: it is a durable `{order -> fires-at}`
//! entry reconciled by the periodic sweep, so a restart loses no timers and
//! cancelling a checkout deterministically cancels its timer.

pub mod expiry;
pub mod orchestrator;
pub mod sweep;

pub use expiry::ExpirySchedule;
pub use orchestrator::{
    CartPort, CartSnapshot, CheckoutConfig, CheckoutEngine, CheckoutQuote, CheckoutSession,
    ConfirmOutcome, MethodOffer, SessionStage,
};
pub use sweep::SweepService;
