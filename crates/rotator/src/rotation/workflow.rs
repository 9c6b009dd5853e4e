//! Certificate rotation workflow
//!
//! One call to [`RotationWorkflow::rotate`] replaces the active certificate:
//!
//! 1. obtain a certificate for the desired domains
//! 2. import it into the certificate store
//! 3. attach it to the listener (the old one stays attached)
//! 4. detach the old certificate
//! 5. wait, bounded, until the store reports the old certificate unused
//! 6. delete the old certificate
//! 7. persist the new state
//!
//! Steps 1-2 abort without touching anything. Steps 3-4 escalate. Steps 5-7
//! are best effort: the returned state always describes the new certificate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cdm_common::{CertificateId, DomainSet};

use super::error::RotationError;
use super::state::{RotationState, StateStore};
use crate::acme::CertificateAuthority;
use crate::cloud::{CertificateStore, ListenerManager};

/// Bounds on the wait for an old certificate to be released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasePolicy {
    /// Delay between usage checks
    pub poll_interval: Duration,
    /// Give up and keep the old certificate after this long
    pub timeout: Duration,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// What happened to the previous certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// There was no previous certificate
    NothingToRetire,
    Deleted(CertificateId),
    /// Still referenced when the release wait timed out; left in the store
    StillInUse { old: CertificateId, users: Vec<String> },
    /// Shutdown was requested during the release wait
    Abandoned(CertificateId),
    /// The release check or the delete call failed
    Failed { old: CertificateId, message: String },
}

/// Result of a completed rotation
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub state: RotationState,
    pub cleanup: CleanupOutcome,
    /// Whether the new state reached durable storage
    pub persisted: bool,
}

enum Release {
    Released,
    StillInUse(Vec<String>),
    Cancelled,
    CheckFailed(String),
}

/// Runs rotations against the configured collaborators.
///
/// Holds no state of its own; the caller owns the [`RotationState`].
pub struct RotationWorkflow {
    /// Issues certificates for a domain set
    authority: Arc<dyn CertificateAuthority>,
    /// Holds imported certificates
    certificates: Arc<dyn CertificateStore>,
    /// The listener serving the certificate
    listener: Arc<dyn ListenerManager>,
    /// Durable copy of the rotation state
    state_store: Arc<dyn StateStore>,
    /// Bounds on the wait before deleting the old certificate
    release: ReleasePolicy,
}

impl RotationWorkflow {
    /// Create a workflow over the given collaborators
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        certificates: Arc<dyn CertificateStore>,
        listener: Arc<dyn ListenerManager>,
        state_store: Arc<dyn StateStore>,
        release: ReleasePolicy,
    ) -> Self {
        Self {
            authority,
            certificates,
            listener,
            state_store,
            release,
        }
    }

    /// Replace the certificate described by `current` with one covering `desired`.
    ///
    /// Cancellation is honoured up to the import; an in-flight obtain is
    /// dropped. Once the store holds the new certificate the listener update
    /// and persistence always run.
    pub async fn rotate(
        &self,
        current: &RotationState,
        desired: &DomainSet,
        cancel: &CancellationToken,
    ) -> Result<RotationOutcome, RotationError> {
        let old = current.certificate_id().cloned();

        let material = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(domains = %desired, "Shutdown requested, abandoning certificate request");
                return Err(RotationError::Cancelled("obtain"));
            }
            result = self.authority.obtain(desired) => {
                result.map_err(|source| RotationError::Obtain {
                    domains: desired.clone(),
                    source,
                })?
            }
        };

        if cancel.is_cancelled() {
            return Err(RotationError::Cancelled("import"));
        }
        let new = self
            .certificates
            .import(material)
            .await
            .map_err(|source| RotationError::Import {
                domains: desired.clone(),
                source,
            })?;

        self.listener
            .attach(&new)
            .await
            .map_err(|source| RotationError::Attach {
                new: new.clone(),
                listener: self.listener.listener().clone(),
                source,
            })?;

        let cleanup = match old {
            None => CleanupOutcome::NothingToRetire,
            Some(old) => {
                self.listener
                    .detach(&old)
                    .await
                    .map_err(|source| RotationError::Detach {
                        new: new.clone(),
                        old: old.clone(),
                        listener: self.listener.listener().clone(),
                        source,
                    })?;
                self.retire(old, cancel).await
            }
        };

        let state = RotationState::installed(desired.clone(), new, Utc::now());
        let persisted = self.persist(&state).await;

        info!(
            domains = %desired,
            certificate_arn = ?state.certificate_id(),
            cleanup = ?cleanup,
            persisted,
            "Rotation complete"
        );

        Ok(RotationOutcome {
            state,
            cleanup,
            persisted,
        })
    }

    /// Steps 5 and 6: delete the old certificate once nothing references it
    async fn retire(&self, old: CertificateId, cancel: &CancellationToken) -> CleanupOutcome {
        match self.await_release(&old, cancel).await {
            Release::Released => match self.certificates.delete(&old).await {
                Ok(()) => CleanupOutcome::Deleted(old),
                Err(e) => {
                    warn!(
                        certificate_arn = %old,
                        error = %e,
                        "Failed to delete old certificate, leaving it orphaned"
                    );
                    CleanupOutcome::Failed {
                        old,
                        message: e.to_string(),
                    }
                }
            },
            Release::StillInUse(users) => {
                warn!(
                    certificate_arn = %old,
                    in_use_by = ?users,
                    timeout_secs = self.release.timeout.as_secs(),
                    "Old certificate still in use after release timeout, skipping deletion"
                );
                CleanupOutcome::StillInUse { old, users }
            }
            Release::Cancelled => {
                warn!(certificate_arn = %old, "Shutdown during release wait, skipping deletion");
                CleanupOutcome::Abandoned(old)
            }
            Release::CheckFailed(message) => {
                warn!(
                    certificate_arn = %old,
                    error = %message,
                    "Could not check old certificate usage, skipping deletion"
                );
                CleanupOutcome::Failed { old, message }
            }
        }
    }

    async fn await_release(&self, old: &CertificateId, cancel: &CancellationToken) -> Release {
        let deadline = Instant::now() + self.release.timeout;

        loop {
            let users = match self.certificates.in_use_by(old).await {
                Ok(users) => users,
                Err(e) => return Release::CheckFailed(e.to_string()),
            };
            if users.is_empty() {
                debug!(certificate_arn = %old, "Old certificate released");
                return Release::Released;
            }

            if Instant::now() + self.release.poll_interval >= deadline {
                return Release::StillInUse(users);
            }
            debug!(certificate_arn = %old, in_use_by = users.len(), "Waiting for certificate release");

            tokio::select! {
                _ = cancel.cancelled() => return Release::Cancelled,
                _ = tokio::time::sleep(self.release.poll_interval) => {}
            }
        }
    }

    /// Step 7; failure leaves the in-memory state ahead of storage
    async fn persist(&self, state: &RotationState) -> bool {
        match self.state_store.save(state).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    location = %self.state_store.location(),
                    certificate_arn = ?state.certificate_id(),
                    domains = %state.domains(),
                    error = %e,
                    "Rotation succeeded but state was not persisted; in-memory state is now ahead of \
                     durable state and a restart will rotate again"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::testing::{Call, Harness};
    use chrono::TimeZone;

    fn domains(names: &[&str]) -> DomainSet {
        names.iter().copied().collect()
    }

    fn installed_old() -> RotationState {
        RotationState::installed(
            domains(&["example.com"]),
            CertificateId::new("old").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_rotation_has_nothing_to_retire() {
        let harness = Harness::new();
        let desired = domains(&["example.com"]);

        let outcome = harness
            .workflow()
            .rotate(&RotationState::bootstrap(), &desired, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.cleanup, CleanupOutcome::NothingToRetire);
        assert!(outcome.persisted);
        assert_eq!(harness.saved(), Some(outcome.state.clone()));
        assert_eq!(outcome.state.domains(), &desired);
        assert_eq!(outcome.state.certificate_id().map(|c| c.as_str()), Some("cert-1"));
        assert_eq!(
            harness.calls(),
            vec![
                Call::Obtain(desired.clone()),
                Call::Import,
                Call::Attach("cert-1".into()),
                Call::Save(Some("cert-1".into())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_rotation_order() {
        let harness = Harness::new();
        let desired = domains(&["example.com", "test.example.com"]);

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &desired, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.cleanup,
            CleanupOutcome::Deleted(CertificateId::new("old").unwrap())
        );
        assert_eq!(
            harness.calls(),
            vec![
                Call::Obtain(desired.clone()),
                Call::Import,
                Call::Attach("cert-1".into()),
                Call::Detach("old".into()),
                Call::InUseBy("old".into()),
                Call::Delete("old".into()),
                Call::Save(Some("cert-1".into())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_obtain_failure_changes_nothing() {
        let harness = Harness::new();
        harness.fail_obtain();
        let current = installed_old();
        let before = current.clone();

        let err = harness
            .workflow()
            .rotate(&current, &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RotationError::Obtain { .. }));
        assert_eq!(current, before);
        assert_eq!(harness.calls(), vec![Call::Obtain(domains(&["example.com"]))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_failure_changes_nothing() {
        let harness = Harness::new();
        harness.fail_import();

        let err = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RotationError::Import { .. }));
        assert!(!harness.calls().iter().any(|c| matches!(
            c,
            Call::Attach(_) | Call::Detach(_) | Call::Save(_)
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_failure_stops_before_detach() {
        let harness = Harness::new();
        harness.fail_attach();

        let err = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RotationError::Attach { .. }));
        assert_eq!(harness.calls().last(), Some(&Call::Attach("cert-1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_failure_escalates_without_persisting() {
        let harness = Harness::new();
        harness.fail_detach();

        let err = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RotationError::Detach { new, old, .. } => {
                assert_eq!(new.as_str(), "cert-1");
                assert_eq!(old.as_str(), "old");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!harness.calls().iter().any(|c| matches!(c, Call::Save(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_timeout_skips_delete_but_completes() {
        let harness = Harness::new();
        harness.keep_in_use("old");

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome.cleanup, CleanupOutcome::StillInUse { .. }));
        assert!(!harness.calls().iter().any(|c| matches!(c, Call::Delete(_))));
        assert_eq!(outcome.state.certificate_id().map(|c| c.as_str()), Some("cert-1"));
        assert!(outcome.persisted);

        let polls = harness
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::InUseBy(_)))
            .count();
        assert_eq!(polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_a_few_polls_deletes() {
        let harness = Harness::new();
        harness.release_after("old", 3);

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.cleanup,
            CleanupOutcome::Deleted(CertificateId::new("old").unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_is_not_fatal() {
        let harness = Harness::new();
        harness.fail_delete();

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome.cleanup, CleanupOutcome::Failed { .. }));
        assert!(outcome.persisted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_still_returns_new_state() {
        let harness = Harness::new();
        harness.fail_save();

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.persisted);
        assert_eq!(outcome.state.certificate_id().map(|c| c.as_str()), Some("cert-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_obtain() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RotationError::Cancelled("obtain")));
        assert!(harness.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_obtain() {
        let harness = Harness::new();
        harness.slow_obtain(Duration::from_secs(120));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RotationError::Cancelled("obtain")));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(harness.calls(), vec![Call::Obtain(domains(&["example.com"]))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_release_wait_still_persists() {
        let harness = Harness::new();
        harness.keep_in_use("old");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let outcome = harness
            .workflow()
            .rotate(&installed_old(), &domains(&["example.com"]), &cancel)
            .await
            .unwrap();

        assert_eq!(
            outcome.cleanup,
            CleanupOutcome::Abandoned(CertificateId::new("old").unwrap())
        );
        assert!(outcome.persisted);
    }
}
