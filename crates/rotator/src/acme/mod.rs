//! Certificate authority access
//!
//! The rotation workflow only needs one operation from the authority:
//! "give me a signed certificate for these domains". [`CertificateAuthority`]
//! is that seam; [`AcmeClient`] implements it against Let's Encrypt (or any
//! RFC 8555 directory) using HTTP-01 validation.
//!
//! # Challenge Flow
//!
//! 1. [`AcmeClient`] starts a [`ChallengeResponder`] on the local challenge port
//! 2. A new account and order are created for the full domain set
//! 3. Each pending authorization's token is registered with the [`ChallengeManager`]
//! 4. The authority requests `/.well-known/acme-challenge/<token>` on each domain;
//!    the public HTTP surface proxies it to the responder
//! 5. Once the order is ready it is finalized with a fresh key and the chain
//!    is split into [`CertificateMaterial`]
//! 6. The responder is stopped whether or not issuance succeeded

mod bundle;
mod challenge;
mod client;
mod error;

pub use bundle::CertificateMaterial;
pub use challenge::{ChallengeManager, ChallengeResponder};
pub use client::{AcmeClient, AcmeSettings};
pub use error::AcmeError;

use async_trait::async_trait;
use cdm_common::DomainSet;

/// Source of signed certificates
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Obtain a certificate covering exactly `domains`
    async fn obtain(&self, domains: &DomainSet) -> Result<CertificateMaterial, AcmeError>;
}
