use crate::graph::TieBreak;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Pending,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl ComponentState {
    /// Whether moving from `self` to `next` is a legal step
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Ready)
                | (Starting, Failed)
                | (Ready, Stopping)
                | (Ready, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Failed)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentState::Pending => "pending",
            ComponentState::Starting => "starting",
            ComponentState::Ready => "ready",
            ComponentState::Stopping => "stopping",
            ComponentState::Stopped => "stopped",
            ComponentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where the orchestrator as a whole is in its one-shot run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorPhase {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorPhase::Idle => "idle",
            OrchestratorPhase::Starting => "starting",
            OrchestratorPhase::Running => "running",
            OrchestratorPhase::Stopping => "stopping",
            OrchestratorPhase::Stopped => "stopped",
            OrchestratorPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    HealthCheck,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "signal {}", signal),
            ShutdownReason::Error(message) => write!(f, "error: {}", message),
            ShutdownReason::UserRequest => f.write_str("user request"),
            ShutdownReason::HealthCheck => f.write_str("health check"),
        }
    }
}

/// Timeouts and ordering options for one orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOptions {
    pub startup_timeout: Duration,
    pub ready_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub health_timeout: Duration,
    /// Start each dependency layer concurrently instead of one by one
    pub parallel_layers: bool,
    pub tie_break: TieBreak,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            parallel_layers: false,
            tie_break: TieBreak::DiscoveryOrder,
        }
    }
}

/// Snapshot of one managed component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentInfo {
    pub name: String,
    pub state: ComponentState,
    pub dependencies: Vec<String>,
}
