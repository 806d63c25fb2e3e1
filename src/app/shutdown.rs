use super::{Orchestrator, OrchestratorPhase};
use crate::error::{ComponentShutdownError, LifespanError, Result, ScopeError, ShutdownErrors};
use tracing::{debug, error, info};

impl Orchestrator {
    /// Shut every started component down in reverse start order.
    ///
    /// Every shutdown hook is attempted even when earlier ones fail; the
    /// failures are returned together once the sweep is done. Calling this
    /// before startup, or after shutdown, does nothing; a call made while
    /// another shutdown is in progress returns once that sweep has finished.
    pub async fn shutdown_all(&self) -> Result<()> {
        match self.phase() {
            OrchestratorPhase::Idle | OrchestratorPhase::Stopped | OrchestratorPhase::Failed => {
                debug!("Shutdown requested while {}, nothing to do", self.phase());
                return Ok(());
            }
            OrchestratorPhase::Starting => {
                return Err(LifespanError::invalid_phase("shut down", OrchestratorPhase::Starting));
            }
            OrchestratorPhase::Running | OrchestratorPhase::Stopping => {}
        }

        // The sweep holds the scope lock until the phase is `Stopped`, so a
        // concurrent caller waits here for it to finish.
        let mut scopes = self.scopes.lock().await;
        {
            let mut phase = self.phase.write();
            if *phase != OrchestratorPhase::Running {
                debug!("Shutdown already completed ({})", *phase);
                return Ok(());
            }
            *phase = OrchestratorPhase::Stopping;
        }

        info!("Beginning graceful shutdown");
        let released = scopes.exit_all().await;
        self.set_phase(OrchestratorPhase::Stopped);
        drop(scopes);

        match released {
            Ok(()) => {
                info!("Graceful shutdown completed");
                Ok(())
            }
            Err(ScopeError::Release { failures }) => {
                let errors = ShutdownErrors {
                    failures: failures
                        .into_iter()
                        .map(|f| ComponentShutdownError {
                            component: f.scope,
                            cause: f.cause,
                        })
                        .collect(),
                };
                error!("Shutdown completed with errors: {}", errors);
                Err(errors.into())
            }
            Err(other) => Err(other.into()),
        }
    }
}
