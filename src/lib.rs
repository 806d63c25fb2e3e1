pub mod app;
pub mod component;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod graph;
pub mod registry;
pub mod scope;

pub use app::{
    shutdown_channel, ComponentInfo, ComponentState, HealthMonitor, LifecycleOptions,
    Orchestrator, OrchestratorPhase, ShutdownHandle, ShutdownReason, ShutdownSignal,
};
pub use component::{
    CommandHooks, CommandSpec, ComponentDescriptor, ComponentHooks, FnHooks, HealthStatus,
    HookPhase, NoopHooks, ReadinessReport,
};
pub use config::LifespanConfig;
pub use discovery::{
    discover, discover_components, enabled_components, ComponentManifest, DiscoveredComponent,
    Discovery, DuplicatePolicy, HookFactory, ManifestLoader, SourceLoader, SourceTarget,
};
pub use error::{
    ComponentShutdownError, ComponentStartupError, DependencyError, DiscoveryError, HookFailure,
    LifespanError, Result, ScopeError, ShutdownErrors,
};
pub use events::{EventBus, EventFilter, EventReceiver, LifecycleEvent};
pub use graph::{resolve, resolve_with, DependencyGraph, ResolvedOrder, TieBreak};
pub use registry::ComponentRegistry;
pub use scope::{FnScope, LifespanManager, Scope, ScopeHandle, ScopeStack};
