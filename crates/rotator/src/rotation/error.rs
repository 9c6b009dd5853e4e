use thiserror::Error;

use cdm_common::{CertificateId, DomainSet, ListenerId};

use crate::acme::AcmeError;
use crate::cloud::CloudError;
use crate::registry::RegistryError;

/// How the scheduler must react to a failed tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nothing external changed; retry on the next tick
    Transient,
    /// The listener may be half-updated; an operator must look
    Escalated,
}

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("failed to fetch desired domains: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to obtain certificate for [{domains}]: {source}")]
    Obtain {
        domains: DomainSet,
        #[source]
        source: AcmeError,
    },

    #[error("failed to import certificate for [{domains}]: {source}")]
    Import {
        domains: DomainSet,
        #[source]
        source: CloudError,
    },

    #[error("failed to attach certificate {new} to listener {listener}: {source}")]
    Attach {
        new: CertificateId,
        listener: ListenerId,
        #[source]
        source: CloudError,
    },

    #[error(
        "failed to detach certificate {old} from listener {listener} \
         (new certificate {new} is attached): {source}"
    )]
    Detach {
        new: CertificateId,
        old: CertificateId,
        listener: ListenerId,
        #[source]
        source: CloudError,
    },

    #[error("rotation cancelled before {0}")]
    Cancelled(&'static str),

    #[error("rotation is held after an earlier escalated failure")]
    Held,
}

impl RotationError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Attach { .. } | Self::Detach { .. } | Self::Held => Severity::Escalated,
            Self::Registry(_) | Self::Obtain { .. } | Self::Import { .. } | Self::Cancelled(_) => {
                Severity::Transient
            }
        }
    }
}
