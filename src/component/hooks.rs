use super::health::HealthStatus;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which lifecycle hook is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Startup,
    Ready,
    Shutdown,
    HealthCheck,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::Startup => "startup",
            HookPhase::Ready => "ready",
            HookPhase::Shutdown => "shutdown",
            HookPhase::HealthCheck => "health_check",
        };
        f.write_str(name)
    }
}

/// Lifecycle hooks a component may implement.
///
/// Every hook defaults to a no-op, so implementors only override what they
/// need. A component without a `health_check` reports `Healthy`; the
/// orchestrator only asks components that are `Ready`.
#[async_trait]
pub trait ComponentHooks: Send + Sync {
    /// Called in start order once every dependency finished its own `startup`
    async fn startup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called in a second pass after every component reached `Ready`
    async fn ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called in reverse start order
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ComponentHooks for NoopHooks {}

pub type HookFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type HealthFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<HealthStatus>> + Send + Sync>;

/// Closure-backed hooks; any hook left unset is a no-op
#[derive(Clone, Default)]
pub struct FnHooks {
    startup: Option<HookFn>,
    ready: Option<HookFn>,
    shutdown: Option<HookFn>,
    health: Option<HealthFn>,
}

impl FnHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.startup = Some(Arc::new(move || hook().boxed()));
        self
    }

    pub fn on_ready<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.ready = Some(Arc::new(move || hook().boxed()));
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.shutdown = Some(Arc::new(move || hook().boxed()));
        self
    }

    pub fn on_health_check<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HealthStatus>> + Send + 'static,
    {
        self.health = Some(Arc::new(move || hook().boxed()));
        self
    }
}

impl fmt::Debug for FnHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHooks")
            .field("startup", &self.startup.is_some())
            .field("ready", &self.ready.is_some())
            .field("shutdown", &self.shutdown.is_some())
            .field("health", &self.health.is_some())
            .finish()
    }
}

#[async_trait]
impl ComponentHooks for FnHooks {
    async fn startup(&self) -> anyhow::Result<()> {
        match &self.startup {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }

    async fn ready(&self) -> anyhow::Result<()> {
        match &self.ready {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        match &self.shutdown {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> anyhow::Result<HealthStatus> {
        match &self.health {
            Some(hook) => hook().await,
            None => Ok(HealthStatus::Healthy),
        }
    }
}
