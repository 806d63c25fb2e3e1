use super::health::HealthStatus;
use super::hooks::{ComponentHooks, HookPhase};
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::debug;

/// External commands bound to lifecycle hooks, as declared in a manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub startup: Option<Vec<String>>,

    #[serde(default)]
    pub ready: Option<Vec<String>>,

    #[serde(default)]
    pub shutdown: Option<Vec<String>>,

    /// Exit code 0 is healthy, 1 is degraded, anything else unavailable
    #[serde(default)]
    pub health: Option<Vec<String>>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Hooks that run external processes
#[derive(Debug, Clone)]
pub struct CommandHooks {
    component: String,
    spec: CommandSpec,
}

impl CommandHooks {
    pub fn new(component: impl Into<String>, spec: CommandSpec) -> anyhow::Result<Self> {
        let component = component.into();
        for (phase, argv) in [
            (HookPhase::Startup, &spec.startup),
            (HookPhase::Ready, &spec.ready),
            (HookPhase::Shutdown, &spec.shutdown),
            (HookPhase::HealthCheck, &spec.health),
        ] {
            if matches!(argv, Some(argv) if argv.is_empty()) {
                bail!("{} command for '{}' is empty", phase, component);
            }
        }
        Ok(Self { component, spec })
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, phase: HookPhase, argv: &[String]) -> anyhow::Result<ExitStatus> {
        let (program, args) = argv
            .split_first()
            .with_context(|| format!("{} command for '{}' is empty", phase, self.component))?;

        let mut command = Command::new(program);
        command.args(args).envs(&self.spec.env).kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }

        debug!(component = %self.component, %phase, "Running {}", argv.join(" "));
        let output = command
            .output()
            .await
            .with_context(|| format!("failed to spawn `{}`", program))?;

        if !output.stderr.is_empty() {
            debug!(
                component = %self.component,
                %phase,
                "stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }

        Ok(output.status)
    }

    async fn run_checked(&self, phase: HookPhase, argv: &Option<Vec<String>>) -> anyhow::Result<()> {
        let Some(argv) = argv else {
            return Ok(());
        };
        let status = self.run(phase, argv).await?;
        if !status.success() {
            bail!("`{}` exited with {}", argv.join(" "), status);
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentHooks for CommandHooks {
    async fn startup(&self) -> anyhow::Result<()> {
        self.run_checked(HookPhase::Startup, &self.spec.startup).await
    }

    async fn ready(&self) -> anyhow::Result<()> {
        self.run_checked(HookPhase::Ready, &self.spec.ready).await
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.run_checked(HookPhase::Shutdown, &self.spec.shutdown).await
    }

    async fn health_check(&self) -> anyhow::Result<HealthStatus> {
        let Some(argv) = &self.spec.health else {
            return Ok(HealthStatus::Healthy);
        };
        let status = self.run(HookPhase::HealthCheck, argv).await?;
        Ok(match status.code() {
            Some(0) => HealthStatus::Healthy,
            Some(1) => HealthStatus::Degraded,
            _ => HealthStatus::Unavailable,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Option<Vec<String>> {
        Some(parts.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_empty_command_rejected() {
        let spec = CommandSpec {
            startup: Some(Vec::new()),
            ..Default::default()
        };
        assert!(CommandHooks::new("broken", spec).is_err());
    }

    #[tokio::test]
    async fn test_command_hooks_exit_status() {
        let hooks = CommandHooks::new(
            "worker",
            CommandSpec {
                startup: argv(&["true"]),
                shutdown: argv(&["false"]),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(hooks.startup().await.is_ok());
        assert!(hooks.ready().await.is_ok());
        assert!(hooks.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_command_health_codes() {
        let check = |code: &str| {
            CommandHooks::new(
                "worker",
                CommandSpec {
                    health: argv(&["sh", "-c", &format!("exit {}", code)]),
                    ..Default::default()
                },
            )
            .unwrap()
        };

        assert_eq!(check("0").health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(check("1").health_check().await.unwrap(), HealthStatus::Degraded);
        assert_eq!(check("3").health_check().await.unwrap(), HealthStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_command_env_and_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("MARKER".to_string(), "started".to_string());

        let hooks = CommandHooks::new(
            "writer",
            CommandSpec {
                startup: argv(&["sh", "-c", "echo $MARKER > marker.txt"]),
                working_dir: Some(dir.path().to_path_buf()),
                env,
                ..Default::default()
            },
        )
        .unwrap();

        hooks.startup().await.unwrap();
        let content = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
        assert_eq!(content.trim(), "started");
    }
}
