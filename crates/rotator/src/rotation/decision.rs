//! Renewal decision rule
//!
//! Evaluated in order, first match wins:
//!
//! 1. no desired domains: never renew
//! 2. never rotated: renew
//! 3. `now >= last_updated + 60 days`: renew
//! 4. installed domains differ from desired domains (as sets): renew
//! 5. otherwise: keep the current certificate

use chrono::{DateTime, Duration, Utc};

use cdm_common::DomainSet;

use super::state::RotationState;

/// Fixed age at which a certificate is replaced
pub const RENEWAL_HORIZON: Duration = Duration::days(60);

/// Why a rotation is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalReason {
    /// No certificate has ever been installed
    NeverIssued,
    /// The installed certificate reached the renewal horizon
    HorizonReached { age_days: i64 },
    /// The desired domain set no longer matches the installed one
    DomainsChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },
}

impl std::fmt::Display for RenewalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverIssued => write!(f, "no certificate installed"),
            Self::HorizonReached { age_days } => {
                write!(f, "certificate is {} days old", age_days)
            }
            Self::DomainsChanged { added, removed } => write!(
                f,
                "domains changed (added [{}], removed [{}])",
                added.join(","),
                removed.join(",")
            ),
        }
    }
}

/// Decide whether `state` must be replaced to cover `desired` at `now`
pub fn evaluate(
    state: &RotationState,
    desired: &DomainSet,
    now: DateTime<Utc>,
) -> Option<RenewalReason> {
    if desired.is_empty() {
        return None;
    }

    let Some(last_updated) = state.last_updated() else {
        return Some(RenewalReason::NeverIssued);
    };

    let age = now.signed_duration_since(last_updated);
    if age >= RENEWAL_HORIZON {
        return Some(RenewalReason::HorizonReached {
            age_days: age.num_days(),
        });
    }

    if state.domains() != desired {
        return Some(RenewalReason::DomainsChanged {
            added: desired.difference(state.domains()).map(String::from).collect(),
            removed: state.domains().difference(desired).map(String::from).collect(),
        });
    }

    None
}

/// Boolean form of [`evaluate`]
pub fn should_renew(state: &RotationState, desired: &DomainSet, now: DateTime<Utc>) -> bool {
    evaluate(state, desired, now).is_some()
}
