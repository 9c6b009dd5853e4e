//! Signal handling and bounded shutdown.
//!
//! SIGINT and SIGTERM cancel one shared [`CancellationToken`]. Tasks watch
//! the token and wind down on their own; [`drain`] bounds how long the
//! process waits for them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which signal triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Interrupt,
    Terminate,
}

/// Wait for SIGINT or SIGTERM
pub async fn wait_for_signal() -> std::io::Result<SignalType> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| SignalType::Interrupt),
            _ = terminate.recv() => Ok(SignalType::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| SignalType::Interrupt)
    }
}

/// Cancel `cancel` on the first shutdown signal
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Shutdown already requested, signal listener exiting");
            }
            signal = wait_for_signal() => {
                match signal {
                    Ok(signal) => info!(signal = ?signal, "Received shutdown signal"),
                    Err(e) => warn!(error = %e, "Failed to install signal handlers, shutting down"),
                }
                cancel.cancel();
            }
        }
    })
}

/// Wait up to `grace` for `task` to finish, aborting it afterwards.
///
/// Returns `true` if the task finished on its own.
pub async fn drain<T>(name: &str, mut task: JoinHandle<T>, grace: Duration) -> bool {
    info!(task = %name, grace_secs = grace.as_secs(), "Waiting for task to drain");

    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(_)) => {
            debug!(task = %name, "Task drained");
            true
        }
        Ok(Err(e)) => {
            warn!(task = %name, error = %e, "Task ended abnormally during drain");
            true
        }
        Err(_) => {
            warn!(task = %name, grace_secs = grace.as_secs(), "Drain timeout reached, aborting task");
            task.abort();
            false
        }
    }
}
