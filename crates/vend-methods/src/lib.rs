//! Vend Methods - Payment method registry and fee/limit engine
//!
//! A payment method is one configured settlement channel: its kind (crypto,
//! voucher vendor, hosted provider, manual), fee schedule, amount limits, and
//! kind-specific configuration. The registry resolves which methods a buyer
//! may use for a given amount, and turns a selected method into the
//! instruction payload the buyer follows.
//!
//! Limit checks read completed-payment volume from the ledger through the
//! [`SpendingHistory`] seam. They are advisory: two concurrent checkouts near
//! a limit boundary can both pass and jointly exceed it, which is reconciled
//! by admin review rather than a cross-order lock.

pub mod fees;
pub mod instructions;
pub mod method;
pub mod registry;

pub use fees::{FeeMode, FeeSchedule};
pub use instructions::{crypto_qr_payload, payment_instructions, PaymentInstructions, QrRenderer};
pub use method::{
    CryptoNetwork, HostedProvider, Limits, MethodConfig, MethodKind, MethodStatus, PaymentMethod,
    VoucherVendor,
};
pub use registry::{MethodRegistry, SpendingHistory};
