use super::loader::SourceLoader;
use crate::component::{CommandHooks, CommandSpec, ComponentDescriptor, ComponentHooks, NoopHooks};
use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// One component as declared in a manifest file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentManifest {
    pub name: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Lower values start earlier under the priority tie-break
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,
}

fn default_enabled() -> bool {
    true
}

fn default_kind() -> String {
    "noop".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestList {
    component: Vec<ComponentManifest>,
}

impl ComponentManifest {
    /// Parse a manifest file holding either one component at top level or
    /// a `[[component]]` array
    pub fn from_toml(content: &str) -> Result<Vec<ComponentManifest>, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        if table.contains_key("component") {
            let list: ManifestList = toml::Value::Table(table).try_into()?;
            Ok(list.component)
        } else {
            Ok(vec![toml::Value::Table(table).try_into()?])
        }
    }
}

type HookConstructor =
    Arc<dyn Fn(&ComponentManifest, &Path) -> anyhow::Result<Arc<dyn ComponentHooks>> + Send + Sync>;

/// Maps a manifest's `kind` to the hooks implementing it
#[derive(Clone, Default)]
pub struct HookFactory {
    constructors: BTreeMap<String, HookConstructor>,
}

impl HookFactory {
    /// A factory with no kinds registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that knows the `noop` and `command` kinds
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register("noop", |_, _| Ok(Arc::new(NoopHooks) as Arc<dyn ComponentHooks>));
        factory.register("command", build_command_hooks);
        factory
    }

    /// Register a constructor for `kind`, replacing any earlier one.
    ///
    /// The constructor receives the manifest and the directory it was
    /// found in.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&ComponentManifest, &Path) -> anyhow::Result<Arc<dyn ComponentHooks>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(
        &self,
        manifest: &ComponentManifest,
        location: &Path,
    ) -> Result<Arc<dyn ComponentHooks>, DiscoveryError> {
        let constructor =
            self.constructors
                .get(&manifest.kind)
                .ok_or_else(|| DiscoveryError::UnknownKind {
                    location: location.to_path_buf(),
                    kind: manifest.kind.clone(),
                })?;

        let base = location.parent().unwrap_or_else(|| Path::new("."));
        constructor(manifest, base)
            .map_err(|e| DiscoveryError::factory(location, format!("{}: {:#}", manifest.name, e)))
    }
}

impl std::fmt::Debug for HookFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn build_command_hooks(
    manifest: &ComponentManifest,
    base: &Path,
) -> anyhow::Result<Arc<dyn ComponentHooks>> {
    let mut spec = manifest
        .command
        .clone()
        .ok_or_else(|| anyhow::anyhow!("kind 'command' requires a [command] table"))?;

    // Relative working directories are taken from the manifest's directory
    spec.working_dir = Some(match spec.working_dir.take() {
        Some(dir) if dir.is_relative() => base.join(dir),
        Some(dir) => dir,
        None => base.to_path_buf(),
    });

    Ok(Arc::new(CommandHooks::new(&manifest.name, spec)?))
}

/// A manifest entry together with the descriptor built from it
#[derive(Debug, Clone)]
pub struct DiscoveredComponent {
    pub manifest: ComponentManifest,
    pub descriptor: ComponentDescriptor,
}

impl DiscoveredComponent {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn is_enabled(&self) -> bool {
        self.manifest.enabled
    }

    pub fn into_descriptor(self) -> ComponentDescriptor {
        self.descriptor
    }
}

/// Default capability predicate: keep enabled components
pub fn enabled_components(component: &DiscoveredComponent) -> bool {
    component.is_enabled()
}

/// Loads TOML component manifests from disk
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    factory: HookFactory,
}

impl ManifestLoader {
    pub fn new(factory: HookFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &HookFactory {
        &self.factory
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new(HookFactory::with_builtins())
    }
}

impl SourceLoader for ManifestLoader {
    type Item = DiscoveredComponent;

    fn load(&self, location: &Path) -> Result<Vec<DiscoveredComponent>, DiscoveryError> {
        let content = fs::read_to_string(location).map_err(|source| DiscoveryError::Io {
            location: location.to_path_buf(),
            source,
        })?;

        let manifests =
            ComponentManifest::from_toml(&content).map_err(|source| DiscoveryError::Parse {
                location: location.to_path_buf(),
                source,
            })?;

        // Build every entry first so a bad entry rejects the whole file
        manifests
            .into_iter()
            .map(|manifest| {
                let hooks = self.factory.build(&manifest, location)?;
                let descriptor = ComponentDescriptor::new(manifest.name.clone())
                    .depends_on(manifest.dependencies.iter().cloned())
                    .with_priority(manifest.priority)
                    .with_source(location)
                    .with_shared_hooks(hooks);
                Ok(DiscoveredComponent {
                    manifest,
                    descriptor,
                })
            })
            .collect()
    }
}
