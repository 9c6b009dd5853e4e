//! Cloud provider adapters
//!
//! The rotation workflow talks to two provider services through narrow
//! traits: a [`CertificateStore`] holding imported certificates and a
//! [`ListenerManager`] for the load balancer listener serving them. The
//! production implementations use the AWS SDK (ACM and ELBv2); the state
//! document lives in S3 behind [`S3StateStore`].

mod acm;
mod elb;
mod s3;

pub use acm::AcmCertificateStore;
pub use elb::ElbListenerManager;
pub use s3::S3StateStore;

use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use thiserror::Error;
use tracing::debug;

use cdm_common::{CertificateId, ListenerId};

use crate::acme::CertificateMaterial;

/// A failed provider API call, with enough context to diagnose it from logs
#[derive(Error, Debug)]
#[error("{operation} failed (region {region}): {message}")]
pub struct CloudError {
    /// Provider operation, e.g. `acm:ImportCertificate`
    pub operation: &'static str,
    pub region: String,
    pub message: String,
}

impl CloudError {
    pub fn new(operation: &'static str, region: &str, message: impl Into<String>) -> Self {
        Self {
            operation,
            region: region.to_string(),
            message: message.into(),
        }
    }
}

/// Holds imported certificates by opaque identifier
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Import signed material; returns the identifier the store assigned.
    ///
    /// The material is consumed whether or not the import succeeds.
    async fn import(&self, material: CertificateMaterial) -> Result<CertificateId, CloudError>;

    /// Resources still referencing the certificate (empty once released)
    async fn in_use_by(&self, id: &CertificateId) -> Result<Vec<String>, CloudError>;

    async fn delete(&self, id: &CertificateId) -> Result<(), CloudError>;
}

/// Manages the certificate list of the one load balancer listener
#[async_trait]
pub trait ListenerManager: Send + Sync {
    fn listener(&self) -> &ListenerId;

    /// Add a certificate to the listener; existing certificates stay attached
    async fn attach(&self, id: &CertificateId) -> Result<(), CloudError>;

    /// Remove a certificate from the listener
    async fn detach(&self, id: &CertificateId) -> Result<(), CloudError>;
}

/// Upper bound on one provider call, retries included.
///
/// Shutdown waits for an in-progress rotation, so every call it makes must end.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared SDK configuration for every client in `region`
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    debug!(region = %region, "Loading AWS SDK configuration");
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(OPERATION_TIMEOUT)
                .build(),
        )
        .load()
        .await
}
