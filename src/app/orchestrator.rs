use super::runtime::{shutdown_channel, ShutdownHandle, ShutdownSignal};
use super::state::StateTable;
use super::types::{ComponentInfo, LifecycleOptions, OrchestratorPhase};
use crate::component::ComponentDescriptor;
use crate::error::Result;
use crate::events::{EventBus, LifecycleEvent};
use crate::graph::{resolve_with, ResolvedOrder};
use crate::registry::ComponentRegistry;
use crate::scope::{Scope, ScopeStack};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Drives a fixed set of components through startup and shutdown.
///
/// The dependency graph is resolved once at construction, so an unknown
/// dependency or a cycle is reported before any hook runs. An orchestrator
/// is one-shot: after `shutdown_all` (or a failed `startup_all`) it cannot be
/// started again.
pub struct Orchestrator {
    pub(super) components: HashMap<String, ComponentDescriptor>,
    pub(super) order: ResolvedOrder,
    pub(super) options: LifecycleOptions,
    pub(super) events: EventBus,

    // Lifecycle management
    pub(super) states: Arc<StateTable>,
    pub(super) phase: RwLock<OrchestratorPhase>,
    pub(super) scopes: tokio::sync::Mutex<ScopeStack>,
    pub(super) shutdown_handle: ShutdownHandle,
    pub(super) shutdown_signal: Mutex<Option<ShutdownSignal>>,
}

impl Orchestrator {
    /// Validate the dependency graph and prepare every component as `Pending`
    pub fn new(
        descriptors: Vec<ComponentDescriptor>,
        options: LifecycleOptions,
        events: EventBus,
    ) -> Result<Self> {
        let order = match resolve_with(&descriptors, options.tie_break) {
            Ok(order) => order,
            Err(e) => {
                events.publish(LifecycleEvent::DependencyRejected {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };
        info!("Component start order: {}", order.start_order().join(" -> "));

        let states = Arc::new(StateTable::new(
            order.start_order().iter().map(String::as_str),
            events.clone(),
        ));
        let components = descriptors
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        let (shutdown_handle, shutdown_signal) = shutdown_channel();

        Ok(Self {
            components,
            order,
            options,
            events,
            states,
            phase: RwLock::new(OrchestratorPhase::Idle),
            scopes: tokio::sync::Mutex::new(ScopeStack::new()),
            shutdown_handle,
            shutdown_signal: Mutex::new(Some(shutdown_signal)),
        })
    }

    pub fn from_registry(
        registry: ComponentRegistry,
        options: LifecycleOptions,
        events: EventBus,
    ) -> Result<Self> {
        Self::new(registry.into_descriptors(), options, events)
    }

    pub fn phase(&self) -> OrchestratorPhase {
        *self.phase.read()
    }

    pub(super) fn set_phase(&self, phase: OrchestratorPhase) {
        let mut current = self.phase.write();
        debug!("Orchestrator phase {} -> {}", *current, phase);
        *current = phase;
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn order(&self) -> &ResolvedOrder {
        &self.order
    }

    pub fn start_order(&self) -> &[String] {
        self.order.start_order()
    }

    pub fn stop_order(&self) -> &[String] {
        self.order.stop_order()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.get(name)
    }

    /// Every component in start order with its current state
    pub fn list_components(&self) -> Vec<ComponentInfo> {
        self.order
            .start_order()
            .iter()
            .filter_map(|name| {
                let descriptor = self.components.get(name)?;
                Some(ComponentInfo {
                    name: name.clone(),
                    state: self.states.get(name)?,
                    dependencies: descriptor.dependencies().to_vec(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Scope for Orchestrator {
    async fn enter(&self) -> anyhow::Result<()> {
        self.startup_all().await?;
        Ok(())
    }

    async fn exit(&self) -> anyhow::Result<()> {
        self.shutdown_all().await?;
        Ok(())
    }
}
