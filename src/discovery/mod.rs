//! Locating component manifests and turning them into descriptors.

mod components;
mod loader;
mod manifest;
mod source;

#[cfg(test)]
mod tests;

pub use components::{discover_components, DuplicatePolicy};
pub use loader::{discover, Discovery, DiscoveryIter, SourceLoader};
pub use manifest::{
    enabled_components, ComponentManifest, DiscoveredComponent, HookFactory, ManifestLoader,
};
pub use source::{collect_locations, SourceTarget, MANIFEST_EXTENSION, MANIFEST_FILENAME};
