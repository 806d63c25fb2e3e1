use crate::error::{HookFailure, ReleaseFailure, ScopeError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

type Release = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Token for one entered scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    id: u64,
    name: Arc<str>,
}

impl ScopeHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Entry {
    handle: ScopeHandle,
    release: Release,
}

/// Ordered set of acquired scopes, released in strict reverse order.
///
/// `exit_all` attempts every release even when some fail, then reports all
/// failures together.
pub struct ScopeStack {
    entries: Vec<Entry>,
    next_id: u64,
    release_timeout: Option<Duration>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            release_timeout: None,
        }
    }

    /// Bound every release; a release that exceeds it counts as failed
    pub fn with_release_timeout(release_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            release_timeout: Some(release_timeout),
        }
    }

    /// Run `acquire` and, if it succeeds, record `release` for later.
    ///
    /// A failed acquire records nothing; earlier scopes stay entered.
    pub async fn enter<A, AF, R, RF>(
        &mut self,
        name: impl Into<String>,
        acquire: A,
        release: R,
    ) -> Result<ScopeHandle, ScopeError>
    where
        A: FnOnce() -> AF,
        AF: Future<Output = anyhow::Result<()>>,
        R: FnOnce() -> RF + Send + 'static,
        RF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if let Err(cause) = acquire().await {
            debug!(scope = %name, "Scope acquire failed: {:#}", cause);
            return Err(ScopeError::Acquire { scope: name, cause });
        }
        Ok(self.push(name, release))
    }

    /// Record the release action of a resource that is already acquired
    pub fn push<R, RF>(&mut self, name: impl Into<String>, release: R) -> ScopeHandle
    where
        R: FnOnce() -> RF + Send + 'static,
        RF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = ScopeHandle {
            id: self.next_id,
            name: Arc::from(name.into()),
        };
        self.next_id += 1;

        self.entries.push(Entry {
            handle: handle.clone(),
            release: Box::new(move || release().boxed()),
        });
        handle
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entered scope names in acquisition order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.handle.name()).collect()
    }

    /// Release every scope, newest first, collecting failures
    pub async fn exit_all(&mut self) -> Result<(), ScopeError> {
        let mut failures = Vec::new();

        while let Some(entry) = self.entries.pop() {
            let name = entry.handle.name().to_string();
            if let Err(cause) = Self::release(entry, self.release_timeout).await {
                warn!(scope = %name, error = %cause, "Scope release failed");
                failures.push(ReleaseFailure { scope: name, cause });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ScopeError::Release { failures })
        }
    }

    async fn release(entry: Entry, release_timeout: Option<Duration>) -> Result<(), HookFailure> {
        let future = AssertUnwindSafe((entry.release)()).catch_unwind();

        let outcome = match release_timeout {
            Some(limit) => match timeout(limit, future).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(HookFailure::TimedOut(limit)),
            },
            None => future.await,
        };

        match outcome {
            Ok(result) => result.map_err(HookFailure::from_anyhow),
            Err(_) => Err(HookFailure::Failed(anyhow::anyhow!(
                "release of '{}' panicked",
                entry.handle.name()
            ))),
        }
    }

    /// Run `body`, then release every scope however the body ended.
    ///
    /// The body's output is returned next to the release result. A panic in
    /// the body is resumed once all scopes were released.
    pub async fn scoped<F, Fut, T>(mut self, body: F) -> (T, Result<(), ScopeError>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        let released = self.exit_all().await;
        match outcome {
            Ok(value) => (value, released),
            Err(panic) => {
                if let Err(e) = &released {
                    warn!("Scopes released after panic with errors: {}", e);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStack")
            .field("scopes", &self.names())
            .field("release_timeout", &self.release_timeout)
            .finish()
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "Scope stack dropped with {} unreleased scope(s): {}",
                self.entries.len(),
                self.names().join(", ")
            );
        }
    }
}
