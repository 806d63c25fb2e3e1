use crate::app::{ComponentState, OrchestratorPhase};
use crate::component::HookPhase;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifespanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Startup aborted: {0}")]
    Startup(#[from] ComponentStartupError),

    #[error("Shutdown completed with errors: {0}")]
    Shutdown(#[from] ShutdownErrors),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Invalid state transition for {component}: {from} -> {to}")]
    InvalidTransition {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },

    #[error("Cannot {operation} while orchestrator is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: OrchestratorPhase,
    },

    #[error("Unknown component: {name}")]
    UnknownComponent { name: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl LifespanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn invalid_phase(operation: &'static str, phase: OrchestratorPhase) -> Self {
        Self::InvalidPhase { operation, phase }
    }
}

/// A single source location failed to load, or discovery found a conflict.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to read {}: {source}", .location.display())]
    Io {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .location.display())]
    Parse {
        location: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown component kind '{kind}' in {}", .location.display())]
    UnknownKind { location: PathBuf, kind: String },

    #[error("Failed to build component from {}: {message}", .location.display())]
    Factory { location: PathBuf, message: String },

    #[error("Component '{name}' declared again in {location}")]
    DuplicateComponent { name: String, location: String },
}

impl DiscoveryError {
    /// Location the error refers to, if it is tied to a single file
    pub fn location(&self) -> Option<&PathBuf> {
        match self {
            DiscoveryError::Io { location, .. }
            | DiscoveryError::Parse { location, .. }
            | DiscoveryError::UnknownKind { location, .. }
            | DiscoveryError::Factory { location, .. } => Some(location),
            DiscoveryError::DuplicateComponent { .. } => None,
        }
    }

    pub fn factory<S: Into<String>>(location: impl Into<PathBuf>, message: S) -> Self {
        Self::Factory {
            location: location.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Component '{name}' is declared more than once")]
    DuplicateComponent { name: String },
}

/// Why a single hook invocation did not complete
#[derive(Error, Debug)]
pub enum HookFailure {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl HookFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HookFailure::TimedOut(_))
    }

    /// Recover a `HookFailure` that travelled through an `anyhow::Error`
    pub(crate) fn from_anyhow(error: anyhow::Error) -> Self {
        match error.downcast::<HookFailure>() {
            Ok(failure) => failure,
            Err(other) => HookFailure::Failed(other),
        }
    }
}

#[derive(Error, Debug)]
#[error("component '{component}' failed during {phase}: {cause}")]
pub struct ComponentStartupError {
    pub component: String,
    pub phase: HookPhase,
    pub cause: HookFailure,
    /// Components that were started and then unwound, in unwind order
    pub rolled_back: Vec<String>,
    /// Shutdown hooks that failed while unwinding
    pub unwind_failures: Vec<ComponentShutdownError>,
}

#[derive(Error, Debug)]
#[error("component '{component}' failed to shut down: {cause}")]
pub struct ComponentShutdownError {
    pub component: String,
    pub cause: HookFailure,
}

#[derive(Error, Debug, Default)]
#[error("{} component(s) failed: {}", .failures.len(), describe_shutdown_failures(.failures))]
pub struct ShutdownErrors {
    pub failures: Vec<ComponentShutdownError>,
}

impl ShutdownErrors {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn components(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.component.as_str()).collect()
    }
}

fn describe_shutdown_failures(failures: &[ComponentShutdownError]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.component, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Failed to enter scope '{scope}': {cause:#}")]
    Acquire { scope: String, cause: anyhow::Error },

    #[error("{} scope(s) failed to release: {}", .failures.len(), describe_release_failures(.failures))]
    Release { failures: Vec<ReleaseFailure> },

    #[error("Scope '{0}' is already registered")]
    DuplicateScope(String),

    #[error("Scope '{0}' is not registered")]
    UnknownScope(String),
}

#[derive(Debug)]
pub struct ReleaseFailure {
    pub scope: String,
    pub cause: HookFailure,
}

fn describe_release_failures(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.scope, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, LifespanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_display() {
        let err = DependencyError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_hook_failure_round_trips_through_anyhow() {
        let wrapped = anyhow::Error::new(HookFailure::TimedOut(Duration::from_secs(3)));
        let failure = HookFailure::from_anyhow(wrapped);
        assert!(failure.is_timeout());

        let plain = HookFailure::from_anyhow(anyhow::anyhow!("boom"));
        assert!(matches!(plain, HookFailure::Failed(_)));
        assert_eq!(plain.to_string(), "boom");
    }

    #[test]
    fn test_shutdown_errors_display_lists_components() {
        let errors = ShutdownErrors {
            failures: vec![
                ComponentShutdownError {
                    component: "cache".into(),
                    cause: HookFailure::Failed(anyhow::anyhow!("connection reset")),
                },
                ComponentShutdownError {
                    component: "db".into(),
                    cause: HookFailure::TimedOut(Duration::from_millis(500)),
                },
            ],
        };
        let text = errors.to_string();
        assert!(text.starts_with("2 component(s) failed"));
        assert!(text.contains("cache (connection reset)"));
        assert!(text.contains("db (timed out after 500ms)"));
        assert_eq!(errors.components(), vec!["cache", "db"]);
    }
}
