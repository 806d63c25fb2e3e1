use super::{Orchestrator, ShutdownReason};
use crate::error::{LifespanError, Result};
use crate::events::LifecycleEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Requests a shutdown from anywhere in the host
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownHandle {
    /// Returns false if a shutdown was already requested
    pub fn request(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

/// Resolves on the first shutdown request or process signal
pub struct ShutdownSignal {
    receiver: oneshot::Receiver<ShutdownReason>,
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (sender, receiver) = oneshot::channel();
    (
        ShutdownHandle {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        ShutdownSignal { receiver },
    )
}

impl ShutdownSignal {
    /// Wait for SIGINT, SIGTERM (Unix only) or a programmatic request
    pub async fn wait(self) -> ShutdownReason {
        let interrupt = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT signal (Ctrl+C)"),
                Err(e) => {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            reason = self.receiver => {
                reason.unwrap_or_else(|_| ShutdownReason::Error("shutdown channel closed".to_string()))
            }
            _ = interrupt => ShutdownReason::Signal("SIGINT".to_string()),
            _ = terminate() => ShutdownReason::Signal("SIGTERM".to_string()),
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            info!("Received SIGTERM signal");
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

impl Orchestrator {
    /// Handle for requesting shutdown of a running orchestrator
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown_handle.clone()
    }

    /// Wait for a `ShutdownHandle` request, SIGINT or SIGTERM and publish
    /// `ShutdownRequested`.
    ///
    /// Each orchestrator has a single shutdown signal, so only the first
    /// waiter (this or `run_until_signal`) can take it.
    pub async fn wait_for_shutdown(&self) -> Result<ShutdownReason> {
        let signal = self.take_shutdown_signal()?;
        Ok(self.receive_shutdown(signal).await)
    }

    /// Start everything, wait for a shutdown request, then stop everything.
    ///
    /// Returns the process exit code: 0 for a clean shutdown, 1 when some
    /// component failed to stop.
    pub async fn run_until_signal(&self) -> Result<i32> {
        let signal = self.take_shutdown_signal()?;

        self.startup_all().await?;
        info!("All components running, waiting for shutdown signal");
        self.receive_shutdown(signal).await;

        match self.shutdown_all().await {
            Ok(()) => Ok(0),
            Err(LifespanError::Shutdown(errors)) => {
                error!(
                    "{} component(s) failed to stop: {}",
                    errors.failures.len(),
                    errors.components().join(", ")
                );
                Ok(1)
            }
            Err(e) => Err(e),
        }
    }

    fn take_shutdown_signal(&self) -> Result<ShutdownSignal> {
        self.shutdown_signal
            .lock()
            .take()
            .ok_or_else(|| LifespanError::system("Shutdown signal already taken"))
    }

    async fn receive_shutdown(&self, signal: ShutdownSignal) -> ShutdownReason {
        let reason = signal.wait().await;
        info!("Shutting down: {}", reason);
        self.events.publish(LifecycleEvent::ShutdownRequested {
            reason: reason.to_string(),
        });
        reason
    }
}
