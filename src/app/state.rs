use super::{ComponentState, Orchestrator};
use crate::error::{HookFailure, LifespanError, Result};
use crate::events::{EventBus, LifecycleEvent};
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Per-component states, shared with the release actions of started
/// components
pub(super) struct StateTable {
    states: RwLock<HashMap<String, ComponentState>>,
    events: EventBus,
}

impl StateTable {
    pub(super) fn new<'a>(names: impl IntoIterator<Item = &'a str>, events: EventBus) -> Self {
        let states = names
            .into_iter()
            .map(|name| (name.to_string(), ComponentState::Pending))
            .collect();
        Self {
            states: RwLock::new(states),
            events,
        }
    }

    pub(super) fn get(&self, component: &str) -> Option<ComponentState> {
        self.states.read().get(component).copied()
    }

    pub(super) fn snapshot(&self) -> HashMap<String, ComponentState> {
        self.states.read().clone()
    }

    pub(super) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Move a component to `to`, returning the state it left
    pub(super) fn transition(&self, component: &str, to: ComponentState) -> Result<ComponentState> {
        let from = {
            let mut states = self.states.write();
            let current = states
                .get_mut(component)
                .ok_or_else(|| LifespanError::UnknownComponent {
                    name: component.to_string(),
                })?;

            if !current.can_transition_to(to) {
                warn!(
                    component = %component,
                    "Rejected state transition {} -> {}",
                    current,
                    to
                );
                return Err(LifespanError::InvalidTransition {
                    component: component.to_string(),
                    from: *current,
                    to,
                });
            }

            let from = *current;
            *current = to;
            from
        };

        debug!("Component '{}' state changed to: {}", component, to);
        self.events.publish(LifecycleEvent::StateChanged {
            component: component.to_string(),
            from,
            to,
        });
        Ok(from)
    }
}

/// Await a hook under `limit`, turning errors, panics and timeouts into a
/// `HookFailure`
pub(super) async fn run_hook<T, F>(limit: Duration, hook: F) -> std::result::Result<T, HookFailure>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout(limit, AssertUnwindSafe(hook).catch_unwind()).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(HookFailure::Failed(e)),
        Ok(Err(_)) => Err(HookFailure::Failed(anyhow::anyhow!("hook panicked"))),
        Err(_) => Err(HookFailure::TimedOut(limit)),
    }
}

impl Orchestrator {
    /// Get component state
    pub fn state(&self, component: &str) -> Option<ComponentState> {
        self.states.get(component)
    }

    /// Get all component states
    pub fn states(&self) -> HashMap<String, ComponentState> {
        self.states.snapshot()
    }
}
