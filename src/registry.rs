use crate::component::ComponentDescriptor;
use crate::error::DependencyError;
use crate::graph::{self, ResolvedOrder, TieBreak};
use std::collections::HashMap;
use tracing::debug;

/// Descriptors keyed by name, kept in the order they were first registered
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
    index: HashMap<String, usize>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting a name that is already present
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<(), DependencyError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(DependencyError::DuplicateComponent {
                name: descriptor.name().to_string(),
            });
        }
        self.insert_new(descriptor);
        Ok(())
    }

    /// Add or replace a descriptor.
    ///
    /// A replacement keeps the position of the descriptor it replaces and
    /// the previous descriptor is returned.
    pub fn upsert(&mut self, descriptor: ComponentDescriptor) -> Option<ComponentDescriptor> {
        match self.index.get(descriptor.name()) {
            Some(&position) => {
                debug!(component = %descriptor.name(), "Replacing registered component");
                Some(std::mem::replace(&mut self.descriptors[position], descriptor))
            }
            None => {
                self.insert_new(descriptor);
                None
            }
        }
    }

    fn insert_new(&mut self, descriptor: ComponentDescriptor) {
        debug!(component = %descriptor.name(), "Registered component");
        self.index
            .insert(descriptor.name().to_string(), self.descriptors.len());
        self.descriptors.push(descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in registration order
    pub fn list(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }

    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    pub fn into_descriptors(self) -> Vec<ComponentDescriptor> {
        self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn resolve(&self, tie_break: TieBreak) -> Result<ResolvedOrder, DependencyError> {
        graph::resolve_with(&self.descriptors, tie_break)
    }
}

impl FromIterator<ComponentDescriptor> for ComponentRegistry {
    /// Collect descriptors; a repeated name replaces the earlier one
    fn from_iter<I: IntoIterator<Item = ComponentDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for descriptor in iter {
            registry.upsert(descriptor);
        }
        registry
    }
}
