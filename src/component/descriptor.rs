use super::hooks::{ComponentHooks, NoopHooks};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One discoverable unit of pluggable functionality
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: String,
    dependencies: Vec<String>,
    priority: i32,
    source: Option<PathBuf>,
    hooks: Arc<dyn ComponentHooks>,
}

impl ComponentDescriptor {
    /// Create a descriptor with no dependencies and no-op hooks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            priority: 0,
            source: None,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks<H: ComponentHooks + 'static>(self, hooks: H) -> Self {
        self.with_shared_hooks(Arc::new(hooks))
    }

    pub fn with_shared_hooks(mut self, hooks: Arc<dyn ComponentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Add dependencies, keeping declaration order and dropping repeats
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn hooks(&self) -> &Arc<dyn ComponentHooks> {
        &self.hooks
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
