//! Certificate rotation core
//!
//! - [`state`]: the persisted record of the installed certificate
//! - [`decision`]: the pure renewal rule
//! - [`workflow`]: the ordered obtain/import/attach/detach/delete/persist steps
//! - [`scheduler`]: the single-writer loop driving the two above

pub mod decision;
mod error;
pub mod scheduler;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use decision::{evaluate, should_renew, RenewalReason, RENEWAL_HORIZON};
pub use error::{RotationError, Severity};
pub use scheduler::{RotationScheduler, TickOutcome};
pub use state::{
    load_or_bootstrap, RotationState, StateHandle, StateStore, StateStoreError, ZERO_TIME,
};
pub use workflow::{CleanupOutcome, ReleasePolicy, RotationOutcome, RotationWorkflow};
