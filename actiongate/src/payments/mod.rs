//! External side effects: refunds and access revocation.
//!
//! The engine talks to two collaborators, a [`PaymentProcessor`] and an
//! [`AppIntegration`]. Both answer with a typed [`CapabilityReply`] instead
//! of vendor error text. [`RefundExecutor`] composes them into an
//! exactly-once refund.

mod capability;
#[cfg(feature = "http")]
mod http;
mod integration;
mod processor;
mod refund;

pub use capability::{CapabilityReply, Decline, DeclineKind};
#[cfg(feature = "http")]
pub use http::HttpAppIntegration;
pub use integration::{AppIntegration, ProductStatus, RevokeAccess, UnsupportedIntegration};
pub use processor::{Charge, CreateRefund, PaymentProcessor, Refund};
pub use refund::{
    idempotency_key, RefundExecutor, RefundReceipt, RefundRequest, ACCESS_REVOCATION_PENDING,
};
