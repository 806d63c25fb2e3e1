use super::loader::{Discovery, SourceLoader};
use super::manifest::DiscoveredComponent;
use super::source::{collect_locations, SourceTarget};
use crate::error::DiscoveryError;
use crate::events::{EventBus, LifecycleEvent};
use crate::registry::ComponentRegistry;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What to do when two discovered components share a name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The component discovered last replaces the earlier one
    #[default]
    Warn,
    /// Discovery fails with `DiscoveryError::DuplicateComponent`
    Error,
}

/// Scan `targets` and collect the matching components into a registry.
///
/// Broken locations are skipped and published as `LocationSkipped`.
/// Duplicate names are handled according to `policy`.
pub fn discover_components<L, F>(
    targets: &[SourceTarget],
    loader: L,
    predicate: F,
    policy: DuplicatePolicy,
    events: &EventBus,
) -> Result<ComponentRegistry, DiscoveryError>
where
    L: SourceLoader<Item = DiscoveredComponent>,
    F: Fn(&DiscoveredComponent) -> bool + Send + Sync + 'static,
{
    let locations = collect_locations(targets);
    let discovery = Discovery::new(locations, loader, predicate).with_events(events.clone());

    let mut registry = ComponentRegistry::new();
    let mut scan = discovery.iter();
    for component in scan.by_ref() {
        let descriptor = component.into_descriptor();
        let location = descriptor.source().map(|p| p.display().to_string());
        let name = descriptor.name().to_string();

        if let Some(existing) = registry.get(&name) {
            let previous = existing.source().map(|p| p.display().to_string());
            if policy == DuplicatePolicy::Error {
                return Err(DiscoveryError::DuplicateComponent {
                    name,
                    location: location.unwrap_or_else(|| "<unknown>".to_string()),
                });
            }
            events.publish(LifecycleEvent::DuplicateComponent {
                component: name.clone(),
                previous,
                replacement: location.clone(),
            });
        }

        events.publish(LifecycleEvent::ComponentDiscovered {
            component: name,
            location,
        });
        registry.upsert(descriptor);
    }

    info!(
        "Discovered {} component(s) in {} location(s), {} skipped",
        registry.len(),
        discovery.locations().len(),
        scan.skipped()
    );
    Ok(registry)
}
