//! Common types and utilities shared by the certificate manager crates.
//!
//! - [`DomainSet`]: set-semantics domain list used by the renewal decision
//! - [`CertificateId`] / [`ListenerId`]: opaque cloud identifiers
//! - [`init_logging`]: tracing subscriber setup

pub mod domains;
pub mod ids;
pub mod logging;

pub use domains::DomainSet;
pub use ids::{CertificateId, ListenerId};
pub use logging::{init_logging, LogFormat};
