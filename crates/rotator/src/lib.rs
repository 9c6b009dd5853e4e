//! Custom domain certificate rotation.
//!
//! Keeps one TLS certificate on a load balancer listener covering every
//! custom domain in the registry. A single scheduler task decides when a
//! new certificate is needed and runs the rotation; an HTTP task answers
//! health probes and forwards ACME challenges to the local responder.

pub mod acme;
pub mod cloud;
pub mod http;
pub mod registry;
pub mod rotation;
pub mod shutdown;

pub use acme::{AcmeClient, AcmeSettings, CertificateAuthority, CertificateMaterial};
pub use cloud::{
    AcmCertificateStore, CertificateStore, ElbListenerManager, ListenerManager, S3StateStore,
};
pub use registry::{DomainRegistry, PgDomainRegistry};
pub use rotation::{
    RotationError, RotationScheduler, RotationState, RotationWorkflow, StateHandle, StateStore,
};
