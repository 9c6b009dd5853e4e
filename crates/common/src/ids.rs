//! Type-safe identifier newtypes for the certificate manager.
//!
//! Cloud providers hand out opaque identifiers (ARNs) for both certificates
//! and listeners. Wrapping them keeps a certificate id from being passed
//! where a listener id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a certificate held by the certificate store.
///
/// Assigned by the store on import (an ACM ARN in production). Never empty:
/// "no certificate" is modelled as `Option<CertificateId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    /// Wrap a store-assigned identifier, returning `None` for the empty string.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Listener identifier.
///
/// Identifies the load balancer listener whose certificate list is managed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
