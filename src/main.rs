use anyhow::{Context, Result};
use clap::Parser;
use lifespan::{
    discover_components, enabled_components, EventBus, HealthMonitor,
    LifespanConfig, LifespanManager, ManifestLoader, Orchestrator, Scope,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "lifespan")]
#[command(about = "Discover components, order them by dependency and run their lifecycle")]
#[command(version)]
#[command(long_about = "Scans configured directories for component manifests, resolves \
their dependency graph into a start order, starts every component, waits for SIGINT or \
SIGTERM and stops everything again in reverse order.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, help = "Path to TOML configuration file (default: lifespan.toml)")]
    config: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting components")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - discover and resolve but don't start components
    #[arg(long, help = "Discover components and print the start plan without starting them")]
    dry_run: bool,

    /// Print the dry run plan as JSON
    #[arg(long, requires = "dry_run", help = "Print the dry run plan as JSON")]
    json: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stderr")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;
    let exit_code = execute(&args).await;

    // `process::exit` skips destructors; flush the log file first
    drop(log_guard);
    std::process::exit(exit_code?);
}

/// Everything after logging is up; returns the process exit code
async fn execute(args: &Args) -> Result<i32> {
    info!("Starting lifespan v{}", env!("CARGO_PKG_VERSION"));

    let loaded = match args.config.as_deref() {
        Some(path) => {
            info!("Configuration file: {}", path);
            LifespanConfig::load_from_file(path)
        }
        None => LifespanConfig::load(),
    };
    let config = match loaded {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        return Ok(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(0);
    }

    let events = EventBus::new(EVENT_BUS_CAPACITY);

    let registry = discover_components(
        &config.discovery.targets,
        ManifestLoader::default(),
        enabled_components,
        config.discovery.duplicates,
        &events,
    )
    .map_err(|e| {
        error!("Component discovery failed: {}", e);
        e
    })?;

    let orchestrator = Orchestrator::from_registry(registry, config.lifecycle.to_options(), events)
        .map_err(|e| {
            error!("Failed to build component graph: {}", e);
            e
        })?;

    if args.dry_run {
        print_plan(&orchestrator, args.json)?;
        return Ok(0);
    }

    let exit_code = run(Arc::new(orchestrator), &config).await;
    info!("lifespan exited with code: {}", exit_code);
    Ok(exit_code)
}

/// Enter the orchestrator and health monitor, wait for a signal, exit both
async fn run(orchestrator: Arc<Orchestrator>, config: &LifespanConfig) -> i32 {
    let mut manager = LifespanManager::new();
    let monitor = HealthMonitor::new(Arc::clone(&orchestrator), config.health.interval());

    let registered = manager
        .register_shared("components", Arc::clone(&orchestrator) as Arc<dyn Scope>, true, 0)
        .and_then(|_| manager.register("health", monitor, config.health.enabled, 10));
    if let Err(e) = registered {
        error!("Failed to register scopes: {}", e);
        return 1;
    }

    let mut stack = match manager.enter_all().await {
        Ok(stack) => stack,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return 1;
        }
    };

    info!(
        "{} component(s) running, waiting for shutdown signal",
        orchestrator.component_count()
    );
    let mut exit_code = 0;
    if let Err(e) = orchestrator.wait_for_shutdown().await {
        error!("Cannot wait for shutdown: {}", e);
        exit_code = 1;
    }

    match stack.exit_all().await {
        Ok(()) => exit_code,
        Err(e) => {
            warn!("Shutdown completed with errors: {}", e);
            1
        }
    }
}

fn print_plan(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    if json {
        let plan = serde_json::json!({
            "order": orchestrator.order(),
            "components": orchestrator.list_components(),
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if orchestrator.component_count() == 0 {
        println!("No components discovered");
        return Ok(());
    }

    println!("Start order:");
    for (index, name) in orchestrator.start_order().iter().enumerate() {
        let dependencies = orchestrator
            .descriptor(name)
            .map(|d| d.dependencies().join(", "))
            .unwrap_or_default();
        if dependencies.is_empty() {
            println!("  {:>3}. {}", index + 1, name);
        } else {
            println!("  {:>3}. {} (after {})", index + 1, name, dependencies);
        }
    }

    println!("Layers:");
    for (depth, layer) in orchestrator.order().layers().iter().enumerate() {
        println!("  {}: {}", depth, layer.join(", "));
    }

    println!("✓ Dry run completed successfully - {} component(s) resolved", orchestrator.component_count());
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifespan={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    layers.push(stderr_layer);

    let guard = match args.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = file_sink(Path::new(path))?;
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Non-blocking writer for `--log-file`; lines reach the file once the
/// guard is dropped at the latest
fn file_sink(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Lifespan Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Environment variables override it, e.g. LIFESPAN_LIFECYCLE__PARALLEL_LAYERS=true");
    println!();

    let rendered = LifespanConfig::default()
        .to_toml()
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_flushes_when_guard_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let (writer, guard) = file_sink(&path).unwrap();

        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            info!("Stopping component");
            warn!("Shutdown completed with errors");
        });

        drop(guard);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Stopping component"));
        assert!(content.contains("Shutdown completed with errors"));
    }

    #[test]
    fn test_file_sink_requires_file_name() {
        assert!(file_sink(Path::new("/")).is_err());
    }

    #[test]
    fn test_args_default_to_lifespan_toml_lookup() {
        let args = Args::parse_from(["lifespan"]);
        assert!(args.config.is_none());

        let args = Args::parse_from(["lifespan", "--config", "custom.toml", "--dry-run", "--json"]);
        assert_eq!(args.config.as_deref(), Some("custom.toml"));
        assert!(args.dry_run && args.json);
    }
}
