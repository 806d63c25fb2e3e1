use super::state::{run_hook, StateTable};
use super::{ComponentState, Orchestrator, OrchestratorPhase};
use crate::component::{ComponentHooks, HookPhase};
use crate::error::{
    ComponentShutdownError, ComponentStartupError, HookFailure, LifespanError, Result, ScopeError,
};
use crate::events::LifecycleEvent;
use crate::scope::ScopeStack;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// The hook that stopped startup
struct StartFailure {
    component: String,
    phase: HookPhase,
    cause: HookFailure,
}

impl Orchestrator {
    /// Start every component in dependency order, then run the ready pass.
    ///
    /// On the first failure no further component is started, every component
    /// started so far is shut down again in reverse order, and the
    /// orchestrator ends up `Failed`.
    pub async fn startup_all(&self) -> Result<()> {
        {
            let mut phase = self.phase.write();
            if *phase != OrchestratorPhase::Idle {
                return Err(LifespanError::invalid_phase("start", *phase));
            }
            *phase = OrchestratorPhase::Starting;
        }

        info!("Starting {} component(s)", self.component_count());
        let mut scopes = self.scopes.lock().await;

        let started = if self.options.parallel_layers {
            self.start_layered(&mut scopes).await
        } else {
            self.start_sequential(&mut scopes).await
        };
        let outcome = match started {
            Ok(()) => self.run_ready_hooks().await,
            Err(failure) => Err(failure),
        };

        match outcome {
            Ok(()) => {
                self.set_phase(OrchestratorPhase::Running);
                info!("All components started successfully");
                Ok(())
            }
            Err(failure) => {
                let error = self.unwind(&mut scopes, failure).await;
                self.set_phase(OrchestratorPhase::Failed);
                Err(error.into())
            }
        }
    }

    async fn start_sequential(&self, scopes: &mut ScopeStack) -> std::result::Result<(), StartFailure> {
        for name in self.order.start_order() {
            self.start_component(name).await?;
            self.push_release(scopes, name);
        }
        Ok(())
    }

    /// Start each dependency layer concurrently; a layer only begins once
    /// every component of the previous one is `Ready`
    async fn start_layered(&self, scopes: &mut ScopeStack) -> std::result::Result<(), StartFailure> {
        for (depth, layer) in self.order.layers().iter().enumerate() {
            info!("Starting layer {} ({})", depth, layer.join(", "));
            let results = join_all(layer.iter().map(|name| self.start_component(name))).await;

            let mut first_failure = None;
            for (name, result) in layer.iter().zip(results) {
                match result {
                    Ok(()) => self.push_release(scopes, name),
                    Err(failure) => {
                        if first_failure.is_none() {
                            first_failure = Some(failure);
                        }
                    }
                }
            }

            if let Some(failure) = first_failure {
                return Err(failure);
            }
        }
        Ok(())
    }

    async fn start_component(&self, name: &str) -> std::result::Result<(), StartFailure> {
        let hooks = self.hooks_for(name, HookPhase::Startup)?;
        self.transition_or_fail(name, ComponentState::Starting, HookPhase::Startup)?;

        info!(component = %name, "Starting component");
        match run_hook(self.options.startup_timeout, hooks.startup()).await {
            Ok(()) => {
                self.transition_or_fail(name, ComponentState::Ready, HookPhase::Startup)?;
                info!(component = %name, "Component ready");
                Ok(())
            }
            Err(cause) => {
                let _ = self.states.transition(name, ComponentState::Failed);
                Err(self.hook_failed(name, HookPhase::Startup, cause))
            }
        }
    }

    async fn run_ready_hooks(&self) -> std::result::Result<(), StartFailure> {
        for name in self.order.start_order() {
            let hooks = self.hooks_for(name, HookPhase::Ready)?;
            if let Err(cause) = run_hook(self.options.ready_timeout, hooks.ready()).await {
                let _ = self.states.transition(name, ComponentState::Failed);
                return Err(self.hook_failed(name, HookPhase::Ready, cause));
            }
        }
        Ok(())
    }

    /// Record the release of a started component in the scope stack
    fn push_release(&self, scopes: &mut ScopeStack, name: &str) {
        let Some(descriptor) = self.components.get(name) else {
            return;
        };
        let component = name.to_string();
        let hooks = Arc::clone(descriptor.hooks());
        let states = Arc::clone(&self.states);
        let limit = self.options.shutdown_timeout;

        scopes.push(name, move || stop_component(states, component, hooks, limit));
    }

    async fn unwind(&self, scopes: &mut ScopeStack, failure: StartFailure) -> ComponentStartupError {
        let rolled_back: Vec<String> = scopes.names().iter().rev().map(|n| n.to_string()).collect();
        if !rolled_back.is_empty() {
            warn!(
                "Startup of '{}' failed, shutting down {} started component(s)",
                failure.component,
                rolled_back.len()
            );
        }

        let unwind_failures = match scopes.exit_all().await {
            Ok(()) => Vec::new(),
            Err(ScopeError::Release { failures }) => failures
                .into_iter()
                .map(|f| ComponentShutdownError {
                    component: f.scope,
                    cause: f.cause,
                })
                .collect(),
            Err(other) => {
                error!("Unexpected error while unwinding startup: {}", other);
                Vec::new()
            }
        };

        ComponentStartupError {
            component: failure.component,
            phase: failure.phase,
            cause: failure.cause,
            rolled_back,
            unwind_failures,
        }
    }

    fn hooks_for(
        &self,
        name: &str,
        phase: HookPhase,
    ) -> std::result::Result<Arc<dyn ComponentHooks>, StartFailure> {
        self.components
            .get(name)
            .map(|d| Arc::clone(d.hooks()))
            .ok_or_else(|| StartFailure {
                component: name.to_string(),
                phase,
                cause: HookFailure::Failed(anyhow::anyhow!("component '{}' is not registered", name)),
            })
    }

    fn transition_or_fail(
        &self,
        name: &str,
        to: ComponentState,
        phase: HookPhase,
    ) -> std::result::Result<(), StartFailure> {
        self.states
            .transition(name, to)
            .map(|_| ())
            .map_err(|e| StartFailure {
                component: name.to_string(),
                phase,
                cause: HookFailure::Failed(e.into()),
            })
    }

    fn hook_failed(&self, name: &str, phase: HookPhase, cause: HookFailure) -> StartFailure {
        self.events.publish(LifecycleEvent::HookFailed {
            component: name.to_string(),
            phase,
            error: cause.to_string(),
        });
        StartFailure {
            component: name.to_string(),
            phase,
            cause,
        }
    }
}

/// Release action of one started component.
///
/// A `Ready` component moves through `Stopping` to `Stopped`. A component
/// that already failed (its ready hook failed) keeps its state but still
/// gets its shutdown hook.
pub(super) async fn stop_component(
    states: Arc<StateTable>,
    component: String,
    hooks: Arc<dyn ComponentHooks>,
    limit: Duration,
) -> anyhow::Result<()> {
    let stopping = states.get(&component) == Some(ComponentState::Ready);
    if stopping {
        states.transition(&component, ComponentState::Stopping)?;
    }

    info!(component = %component, "Stopping component");
    match run_hook(limit, hooks.shutdown()).await {
        Ok(()) => {
            if stopping {
                states.transition(&component, ComponentState::Stopped)?;
            }
            info!(component = %component, "Component stopped");
            Ok(())
        }
        Err(cause) => {
            if stopping {
                let _ = states.transition(&component, ComponentState::Failed);
            }
            states.events().publish(LifecycleEvent::HookFailed {
                component: component.clone(),
                phase: HookPhase::Shutdown,
                error: cause.to_string(),
            });
            Err(cause.into())
        }
    }
}
