//! Rotation scheduler
//!
//! A repeat-after-delay loop: sleep, fetch the desired domains, decide, and
//! rotate if needed. A rotation runs to completion before the next delay
//! starts, so two rotations can never overlap. The scheduler owns the
//! [`RotationState`] and is its only writer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cdm_config::EscalationPolicy;

use super::decision::evaluate;
use super::error::{RotationError, Severity};
use super::state::{RotationState, StateHandle};
use super::workflow::{RotationOutcome, RotationWorkflow};
use crate::registry::DomainRegistry;

/// Result of one successful scheduler tick
#[derive(Debug)]
pub enum TickOutcome {
    UpToDate,
    Rotated(RotationOutcome),
}

/// Periodic rotation check
///
/// Runs as a background task. Each tick compares the registry's domain set
/// with the installed certificate and runs the [`RotationWorkflow`] when the
/// decision rule asks for a new one.
pub struct RotationScheduler {
    /// Source of the desired domain set
    registry: Arc<dyn DomainRegistry>,
    /// Performs the rotation steps
    workflow: RotationWorkflow,
    /// Authoritative state; only this scheduler writes it
    state: RotationState,
    /// Published copy of `state` for readers
    handle: StateHandle,
    /// Delay between checks
    check_interval: Duration,
    /// What to do when a rotation fails after touching the listener
    escalation: EscalationPolicy,
}

impl RotationScheduler {
    /// Create a scheduler starting from `initial`
    ///
    /// # Arguments
    ///
    /// * `registry` - Domain registry queried on every tick
    /// * `workflow` - Rotation workflow wired to the provider adapters
    /// * `initial` - State loaded at startup (bootstrap if none was stored)
    /// * `check_interval` - Delay before each check
    /// * `escalation` - Reaction to an escalated rotation failure
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        workflow: RotationWorkflow,
        initial: RotationState,
        check_interval: Duration,
        escalation: EscalationPolicy,
    ) -> Self {
        let handle = StateHandle::new(initial.clone());
        Self {
            registry,
            workflow,
            state: initial,
            handle,
            check_interval,
            escalation,
        }
    }

    /// Read-only view for other tasks
    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    /// Run until `cancel` fires.
    ///
    /// Returns an error only for an escalated failure under
    /// [`EscalationPolicy::Exit`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RotationError> {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            escalation = ?self.escalation,
            "Starting rotation scheduler"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }

            debug!("Running scheduled rotation check");

            let Err(e) = self.tick(&cancel).await else {
                continue;
            };

            match (e.severity(), self.escalation) {
                (Severity::Transient, _) => {
                    warn!(error = %e, "Rotation check failed, retrying on next tick");
                }
                (Severity::Escalated, EscalationPolicy::Exit) => {
                    error!(error = %e, "Escalated rotation failure, stopping scheduler");
                    return Err(e);
                }
                (Severity::Escalated, EscalationPolicy::Hold) => {
                    self.handle.hold();
                    error!(
                        error = %e,
                        "Rotation held; restart the process once the listener has been checked"
                    );
                }
            }
        }

        info!("Rotation scheduler stopped");
        Ok(())
    }

    /// One check: fetch, decide, and rotate if needed
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Result<TickOutcome, RotationError> {
        if self.handle.is_held() {
            return Err(RotationError::Held);
        }

        let desired = self.registry.domains().await?;

        let Some(reason) = evaluate(&self.state, &desired, Utc::now()) else {
            debug!(domains = %desired, "Certificate is up to date");
            return Ok(TickOutcome::UpToDate);
        };

        info!(
            reason = %reason,
            domains = %desired,
            current_arn = ?self.state.certificate_id(),
            "Certificate rotation needed"
        );

        let outcome = self.workflow.rotate(&self.state, &desired, cancel).await?;
        self.state = outcome.state.clone();
        self.handle.publish(outcome.state.clone());
        Ok(TickOutcome::Rotated(outcome))
    }
}
