mod health;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use health::HealthMonitor;
pub use orchestrator::Orchestrator;
pub use runtime::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use types::{ComponentInfo, ComponentState, LifecycleOptions, OrchestratorPhase, ShutdownReason};
