use super::stack::ScopeStack;
use crate::error::ScopeError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A resource that is entered during startup and exited during shutdown
#[async_trait]
pub trait Scope: Send + Sync {
    async fn enter(&self) -> anyhow::Result<()>;

    async fn exit(&self) -> anyhow::Result<()>;
}

type ScopeFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Scope built from a pair of closures
#[derive(Clone)]
pub struct FnScope {
    enter: ScopeFn,
    exit: ScopeFn,
}

impl FnScope {
    pub fn new<E, EF, X, XF>(enter: E, exit: X) -> Self
    where
        E: Fn() -> EF + Send + Sync + 'static,
        EF: Future<Output = anyhow::Result<()>> + Send + 'static,
        X: Fn() -> XF + Send + Sync + 'static,
        XF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            enter: Arc::new(move || enter().boxed()),
            exit: Arc::new(move || exit().boxed()),
        }
    }
}

#[async_trait]
impl Scope for FnScope {
    async fn enter(&self) -> anyhow::Result<()> {
        (self.enter)().await
    }

    async fn exit(&self) -> anyhow::Result<()> {
        (self.exit)().await
    }
}

struct Registration {
    scope: Arc<dyn Scope>,
    enabled: bool,
    priority: i32,
    sequence: usize,
}

/// Named, prioritised scopes combined into one startup/shutdown unit.
///
/// Enabled scopes are entered by ascending priority (registration order for
/// equal priorities) and exited in the reverse order.
#[derive(Default)]
pub struct LifespanManager {
    scopes: HashMap<String, Registration>,
    next_sequence: usize,
    release_timeout: Option<Duration>,
}

impl LifespanManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release_timeout(mut self, release_timeout: Duration) -> Self {
        self.release_timeout = Some(release_timeout);
        self
    }

    pub fn register<S: Scope + 'static>(
        &mut self,
        name: impl Into<String>,
        scope: S,
        enabled: bool,
        priority: i32,
    ) -> Result<(), ScopeError> {
        self.register_shared(name, Arc::new(scope), enabled, priority)
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        scope: Arc<dyn Scope>,
        enabled: bool,
        priority: i32,
    ) -> Result<(), ScopeError> {
        let name = name.into();
        if self.scopes.contains_key(&name) {
            return Err(ScopeError::DuplicateScope(name));
        }

        debug!(scope = %name, enabled, priority, "Registered scope");
        self.scopes.insert(
            name,
            Registration {
                scope,
                enabled,
                priority,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
        Ok(())
    }

    pub fn enable(&mut self, name: &str) -> Result<(), ScopeError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), ScopeError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ScopeError> {
        let registration = self
            .scopes
            .get_mut(name)
            .ok_or_else(|| ScopeError::UnknownScope(name.to_string()))?;
        registration.enabled = enabled;
        debug!(scope = %name, enabled, "Scope toggled");
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.scopes.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    /// Enabled scope names in entry order
    pub fn list_enabled(&self) -> Vec<String> {
        let mut enabled: Vec<(&String, &Registration)> =
            self.scopes.iter().filter(|(_, r)| r.enabled).collect();
        enabled.sort_by_key(|(_, r)| (r.priority, r.sequence));
        enabled.into_iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
        debug!("Cleared all registered scopes");
    }

    /// Enter every enabled scope in order.
    ///
    /// If one fails, the scopes entered before it are exited again and the
    /// acquire error is returned. On success the returned stack owns every
    /// exit action.
    pub async fn enter_all(&self) -> Result<ScopeStack, ScopeError> {
        let names = self.list_enabled();
        if names.is_empty() {
            debug!("No enabled scopes to enter");
        }

        let mut stack = match self.release_timeout {
            Some(limit) => ScopeStack::with_release_timeout(limit),
            None => ScopeStack::new(),
        };

        for name in names {
            let Some(registration) = self.scopes.get(&name) else {
                continue;
            };
            let entering = Arc::clone(&registration.scope);
            let exiting = Arc::clone(&registration.scope);

            let entered = stack
                .enter(
                    name.clone(),
                    || async move { entering.enter().await },
                    move || async move { exiting.exit().await },
                )
                .await;

            if let Err(e) = entered {
                warn!(scope = %name, "Unwinding {} entered scope(s)", stack.len());
                if let Err(unwind) = stack.exit_all().await {
                    warn!("Unwind after failed scope '{}' reported: {}", name, unwind);
                }
                return Err(e);
            }
            info!(scope = %name, "Scope entered");
        }

        Ok(stack)
    }
}
