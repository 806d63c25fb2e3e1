use super::state::run_hook;
use super::{ComponentState, Orchestrator};
use crate::component::{HealthStatus, ReadinessReport};
use crate::events::LifecycleEvent;
use crate::scope::Scope;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

impl Orchestrator {
    /// Current health of every component.
    ///
    /// Only `Ready` components are asked; anything else is `Unavailable`, as
    /// is a check that errors or exceeds the health timeout.
    pub async fn health_snapshot(&self) -> BTreeMap<String, HealthStatus> {
        let mut snapshot = BTreeMap::new();

        for name in self.order.start_order() {
            let status = match (self.states.get(name), self.components.get(name)) {
                (Some(ComponentState::Ready), Some(descriptor)) => {
                    let hooks = Arc::clone(descriptor.hooks());
                    match run_hook(self.options.health_timeout, hooks.health_check()).await {
                        Ok(status) => status,
                        Err(e) => {
                            warn!(component = %name, error = %e, "Health check failed");
                            HealthStatus::Unavailable
                        }
                    }
                }
                _ => HealthStatus::Unavailable,
            };
            snapshot.insert(name.clone(), status);
        }

        snapshot
    }

    /// Aggregate readiness; the worst component decides
    pub async fn readiness(&self) -> ReadinessReport {
        ReadinessReport::from_components(self.health_snapshot().await)
    }
}

/// Periodically polls an orchestrator's health and reports changes
pub struct HealthMonitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    last: Arc<Mutex<BTreeMap<String, HealthStatus>>>,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            last: Arc::new(Mutex::new(BTreeMap::new())),
            cancellation_token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Run one check now, publishing `HealthChanged` for every component
    /// whose status differs from the previous check
    pub async fn poll(&self) -> ReadinessReport {
        check(&self.orchestrator, &self.last).await
    }

    /// Last observed status of every component
    pub fn last_statuses(&self) -> BTreeMap<String, HealthStatus> {
        self.last.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the polling task; does nothing if it is already running
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let last = Arc::clone(&self.last);
        let token = self.cancellation_token.clone();
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Health monitor started with interval {:?}", period);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        check(&orchestrator, &last).await;
                    }
                }
            }
            debug!("Health monitor stopped");
        }));
    }

    /// Cancel the polling task and wait for it to finish
    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Health monitor task ended abnormally: {}", e);
            }
        }
    }
}

async fn check(
    orchestrator: &Orchestrator,
    last: &Mutex<BTreeMap<String, HealthStatus>>,
) -> ReadinessReport {
    let report = orchestrator.readiness().await;

    let changes: Vec<LifecycleEvent> = {
        let mut previous = last.lock();
        let changes = report
            .components
            .iter()
            .filter(|(name, status)| previous.get(*name) != Some(*status))
            .map(|(name, status)| LifecycleEvent::HealthChanged {
                component: name.clone(),
                from: previous.get(name).copied(),
                to: *status,
            })
            .collect();
        *previous = report.components.clone();
        changes
    };

    for event in changes {
        orchestrator.events().publish(event);
    }
    report
}

#[async_trait]
impl Scope for HealthMonitor {
    async fn enter(&self) -> anyhow::Result<()> {
        self.start();
        Ok(())
    }

    async fn exit(&self) -> anyhow::Result<()> {
        self.stop().await;
        Ok(())
    }
}
