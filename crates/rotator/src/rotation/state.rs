//! Rotation state and its persistence contract
//!
//! The state document is a small JSON object:
//!
//! ```text
//! { "domains": ["a.example.com"], "last_updated": "<RFC3339>", "certificate_arn": "<id>" }
//! ```
//!
//! A deployment that never rotated stores `last_updated` as
//! `0001-01-01T00:00:00Z` and `certificate_arn` as `""`. Both read back as
//! "never" / "none".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cdm_common::{CertificateId, DomainSet};

/// Serialized form of "never rotated"
pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// The currently installed certificate and the domains it covers.
///
/// Either both `last_updated` and `certificate_id` are set, or neither is.
/// The constructors are the only way to build a value, so the pairing holds
/// for every instance, including deserialized ones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "StateDocument", into = "StateDocument")]
pub struct RotationState {
    domains: DomainSet,
    last_updated: Option<DateTime<Utc>>,
    certificate_id: Option<CertificateId>,
}

impl RotationState {
    /// State of a deployment that has never installed a certificate
    pub fn bootstrap() -> Self {
        Self::default()
    }

    /// State after a successful rotation
    pub fn installed(
        domains: DomainSet,
        certificate_id: CertificateId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            domains,
            last_updated: Some(at),
            certificate_id: Some(certificate_id),
        }
    }

    pub fn domains(&self) -> &DomainSet {
        &self.domains
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn certificate_id(&self) -> Option<&CertificateId> {
        self.certificate_id.as_ref()
    }

    pub fn is_bootstrap(&self) -> bool {
        self.certificate_id.is_none()
    }
}

/// Wire shape of [`RotationState`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    domains: Option<DomainSet>,
    #[serde(default, with = "zero_time")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    certificate_arn: String,
}

impl TryFrom<StateDocument> for RotationState {
    type Error = String;

    fn try_from(doc: StateDocument) -> Result<Self, Self::Error> {
        let domains = doc.domains.unwrap_or_default();
        match (doc.last_updated, CertificateId::new(doc.certificate_arn)) {
            (Some(at), Some(id)) => Ok(Self::installed(domains, id, at)),
            (None, None) => Ok(Self {
                domains,
                last_updated: None,
                certificate_id: None,
            }),
            (Some(at), None) => Err(format!(
                "last_updated is {} but certificate_arn is empty",
                at.to_rfc3339()
            )),
            (None, Some(id)) => Err(format!(
                "certificate_arn is {} but last_updated is unset",
                id
            )),
        }
    }
}

impl From<RotationState> for StateDocument {
    fn from(state: RotationState) -> Self {
        Self {
            domains: Some(state.domains),
            last_updated: state.last_updated,
            certificate_arn: state
                .certificate_id
                .map(CertificateId::into_string)
                .unwrap_or_default(),
        }
    }
}

mod zero_time {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => at.serialize(s),
            None => s.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<DateTime<Utc>> = Option::deserialize(d)?;
        Ok(raw.filter(|at| at.year() > 1))
    }
}

/// Errors from a [`StateStore`]
#[derive(Error, Debug)]
pub enum StateStoreError {
    /// No document at the configured location
    #[error("state document not found at {location}")]
    NotFound { location: String },

    #[error("state document at {location} is corrupt: {message}")]
    Corrupt { location: String, message: String },

    #[error("state backend error at {location}: {message}")]
    Backend { location: String, message: String },
}

/// Durable storage for the single [`RotationState`] document
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the stored state; a missing document is [`StateStoreError::NotFound`]
    async fn load(&self) -> Result<RotationState, StateStoreError>;

    /// Overwrite the stored state
    async fn save(&self, state: &RotationState) -> Result<(), StateStoreError>;

    /// Live write/read/delete round trip against the storage location
    async fn probe(&self) -> Result<(), StateStoreError>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Load the stored state, treating a missing document as the bootstrap state
pub async fn load_or_bootstrap(store: &dyn StateStore) -> Result<RotationState, StateStoreError> {
    match store.load().await {
        Ok(state) => Ok(state),
        Err(StateStoreError::NotFound { location }) => {
            tracing::info!(
                location = %location,
                "No stored rotation state, starting from bootstrap"
            );
            Ok(RotationState::bootstrap())
        }
        Err(e) => Err(e),
    }
}

/// Read-only view of the scheduler's state.
///
/// The scheduler is the only writer; it publishes a fresh immutable snapshot
/// after each rotation. Readers never see a partially updated value.
#[derive(Debug, Clone)]
pub struct StateHandle {
    current: Arc<ArcSwap<RotationState>>,
    held: Arc<AtomicBool>,
}

impl StateHandle {
    pub fn new(initial: RotationState) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> Arc<RotationState> {
        self.current.load_full()
    }

    /// Whether rotation is held after an escalated failure
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, state: RotationState) {
        self.current.store(Arc::new(state));
    }

    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::Release);
    }
}
