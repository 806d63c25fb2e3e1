use crate::app::LifecycleOptions;
use crate::discovery::{DuplicatePolicy, SourceTarget};
use crate::graph::TieBreak;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifespanConfig {
    pub discovery: DiscoveryConfig,
    pub lifecycle: LifecycleConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// `warn` keeps the last duplicate, `error` aborts discovery
    #[serde(default)]
    pub duplicates: DuplicatePolicy,

    /// Directory trees searched for component manifests
    #[serde(default = "default_targets")]
    pub targets: Vec<SourceTarget>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifecycleConfig {
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Start independent components of the same dependency depth together
    #[serde(default)]
    pub parallel_layers: bool,

    #[serde(default)]
    pub tie_break: TieBreak,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,

    #[serde(default = "default_health_interval")]
    pub interval_seconds: u64,
}

impl LifespanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("lifespan.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// Values are layered: defaults, then the file if it exists, then
    /// `LIFESPAN_` environment variables using `__` between sections
    /// (e.g. `LIFESPAN_LIFECYCLE__PARALLEL_LAYERS=true`).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("discovery.duplicates", "warn")?
            .set_default("lifecycle.startup_timeout_ms", default_startup_timeout_ms() as i64)?
            .set_default("lifecycle.ready_timeout_ms", default_ready_timeout_ms() as i64)?
            .set_default("lifecycle.shutdown_timeout_ms", default_shutdown_timeout_ms() as i64)?
            .set_default("lifecycle.health_timeout_ms", default_health_timeout_ms() as i64)?
            .set_default("lifecycle.parallel_layers", false)?
            .set_default("lifecycle.tie_break", "discovery_order")?
            .set_default("health.enabled", default_health_enabled())?
            .set_default("health.interval_seconds", default_health_interval() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with LIFESPAN_ prefix
            .add_source(
                Environment::with_prefix("LIFESPAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: LifespanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.targets.is_empty() {
            return Err(ConfigError::Message(
                "At least one discovery target is required".to_string(),
            ));
        }

        for target in &self.discovery.targets {
            if target.directory.as_os_str().is_empty() {
                return Err(ConfigError::Message(
                    "Discovery target directory must not be empty".to_string(),
                ));
            }
            if matches!(&target.filename, Some(name) if name.is_empty()) {
                return Err(ConfigError::Message(format!(
                    "Discovery target {} has an empty filename",
                    target.directory.display()
                )));
            }
        }

        for (name, value) in [
            ("startup_timeout_ms", self.lifecycle.startup_timeout_ms),
            ("ready_timeout_ms", self.lifecycle.ready_timeout_ms),
            ("shutdown_timeout_ms", self.lifecycle.shutdown_timeout_ms),
            ("health_timeout_ms", self.lifecycle.health_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Lifecycle {} must be greater than 0",
                    name
                )));
            }
        }

        if self.health.enabled && self.health.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Health interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl LifecycleConfig {
    pub fn to_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
            parallel_layers: self.parallel_layers,
            tie_break: self.tie_break,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for LifespanConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig {
                duplicates: DuplicatePolicy::default(),
                targets: default_targets(),
            },
            lifecycle: LifecycleConfig {
                startup_timeout_ms: default_startup_timeout_ms(),
                ready_timeout_ms: default_ready_timeout_ms(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
                health_timeout_ms: default_health_timeout_ms(),
                parallel_layers: false,
                tie_break: TieBreak::default(),
            },
            health: HealthConfig {
                enabled: default_health_enabled(),
                interval_seconds: default_health_interval(),
            },
        }
    }
}

// Default value functions
fn default_targets() -> Vec<SourceTarget> {
    vec![SourceTarget::new("components")]
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_health_enabled() -> bool {
    true
}

fn default_health_interval() -> u64 {
    30
}
