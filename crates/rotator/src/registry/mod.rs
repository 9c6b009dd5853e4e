//! Domain registry: the authoritative list of custom domains to protect

mod postgres;

pub use postgres::PgDomainRegistry;

use async_trait::async_trait;
use thiserror::Error;

use cdm_common::DomainSet;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to connect to domain registry at {address}: {message}")]
    Connect { address: String, message: String },

    #[error("domain query for environment '{environment}' failed: {message}")]
    Query { environment: String, message: String },
}

/// Read-only source of the desired domain set
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    /// Domains that the certificate must currently cover
    async fn domains(&self) -> Result<DomainSet, RegistryError>;

    /// Check the registry is reachable
    async fn ping(&self) -> Result<(), RegistryError>;
}
