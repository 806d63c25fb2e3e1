use super::*;
use crate::error::ScopeError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn recording_scope(log: &Log, name: &str) -> FnScope {
    let enter_log = Arc::clone(log);
    let exit_log = Arc::clone(log);
    let enter_name = format!("enter:{}", name);
    let exit_name = format!("exit:{}", name);
    FnScope::new(
        move || {
            let log = Arc::clone(&enter_log);
            let entry = enter_name.clone();
            async move {
                log.lock().push(entry);
                Ok(())
            }
        },
        move || {
            let log = Arc::clone(&exit_log);
            let entry = exit_name.clone();
            async move {
                log.lock().push(entry);
                Ok(())
            }
        },
    )
}

fn failing_enter_scope(log: &Log, name: &str) -> FnScope {
    let exit_log = Arc::clone(log);
    let exit_name = format!("exit:{}", name);
    FnScope::new(
        || async { Err(anyhow::anyhow!("refused")) },
        move || {
            let log = Arc::clone(&exit_log);
            let entry = exit_name.clone();
            async move {
                log.lock().push(entry);
                Ok(())
            }
        },
    )
}

async fn push_recording(stack: &mut ScopeStack, log: &Log, name: &str) {
    let log = Arc::clone(log);
    let entry = name.to_string();
    stack
        .enter(
            name,
            || async { Ok(()) },
            move || async move {
                log.lock().push(entry);
                Ok(())
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stack_releases_in_reverse_order() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    for name in ["first", "second", "third"] {
        push_recording(&mut stack, &log, name).await;
    }

    assert_eq!(stack.len(), 3);
    assert_eq!(stack.names(), vec!["first", "second", "third"]);

    stack.exit_all().await.unwrap();
    assert!(stack.is_empty());
    assert_eq!(*log.lock(), vec!["third", "second", "first"]);
}

#[tokio::test]
async fn test_stack_continues_past_release_failure() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    push_recording(&mut stack, &log, "first").await;
    stack.push("broken", || async { Err(anyhow::anyhow!("release failed")) });
    push_recording(&mut stack, &log, "last").await;

    match stack.exit_all().await {
        Err(ScopeError::Release { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].scope, "broken");
            assert!(!failures[0].cause.is_timeout());
        }
        other => panic!("Expected release failure, got {:?}", other),
    }
    assert_eq!(*log.lock(), vec!["last", "first"]);
}

#[tokio::test]
async fn test_stack_release_panic_is_contained() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    push_recording(&mut stack, &log, "survivor").await;
    stack.push("panicky", || async {
        if true {
            panic!("boom");
        }
        Ok(())
    });

    let result = stack.exit_all().await;
    assert!(matches!(result, Err(ScopeError::Release { ref failures }) if failures.len() == 1));
    assert_eq!(*log.lock(), vec!["survivor"]);
}

#[tokio::test(start_paused = true)]
async fn test_stack_release_timeout() {
    let log = new_log();
    let mut stack = ScopeStack::with_release_timeout(Duration::from_millis(50));
    push_recording(&mut stack, &log, "quick").await;
    stack.push("stuck", || async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    });

    match stack.exit_all().await {
        Err(ScopeError::Release { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].scope, "stuck");
            assert!(failures[0].cause.is_timeout());
        }
        other => panic!("Expected release timeout, got {:?}", other),
    }
    assert_eq!(*log.lock(), vec!["quick"]);
}

#[tokio::test]
async fn test_stack_failed_acquire_records_nothing() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    push_recording(&mut stack, &log, "held").await;

    let result = stack
        .enter(
            "refused",
            || async { Err(anyhow::anyhow!("no capacity")) },
            || async { Ok(()) },
        )
        .await;

    match result {
        Err(ScopeError::Acquire { scope, .. }) => assert_eq!(scope, "refused"),
        other => panic!("Expected acquire failure, got {:?}", other),
    }
    assert_eq!(stack.names(), vec!["held"]);
    stack.exit_all().await.unwrap();
}

#[tokio::test]
async fn test_scoped_releases_after_body() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    push_recording(&mut stack, &log, "outer").await;
    push_recording(&mut stack, &log, "inner").await;

    let body_log = Arc::clone(&log);
    let (value, released) = stack
        .scoped(|| async move {
            body_log.lock().push("body".to_string());
            42
        })
        .await;

    assert_eq!(value, 42);
    released.unwrap();
    assert_eq!(*log.lock(), vec!["body", "inner", "outer"]);
}

#[tokio::test]
async fn test_scoped_releases_when_body_panics() {
    let log = new_log();
    let mut stack = ScopeStack::new();
    push_recording(&mut stack, &log, "guarded").await;

    let outcome = tokio::spawn(async move {
        stack
            .scoped(|| async {
                panic!("body failed");
            })
            .await
    })
    .await;

    assert!(outcome.unwrap_err().is_panic());
    assert_eq!(*log.lock(), vec!["guarded"]);
}

#[tokio::test]
async fn test_handles_are_unique() {
    let mut stack = ScopeStack::new();
    let a = stack.push("same", || async { Ok(()) });
    let b = stack.push("same", || async { Ok(()) });

    assert_ne!(a, b);
    assert_eq!(a.name(), b.name());
    assert!(b.id() > a.id());
    stack.exit_all().await.unwrap();
}

#[tokio::test]
async fn test_manager_enters_by_priority() {
    let log = new_log();
    let mut manager = LifespanManager::new();
    manager
        .register("monitor", recording_scope(&log, "monitor"), true, 10)
        .unwrap();
    manager
        .register("database", recording_scope(&log, "database"), true, 0)
        .unwrap();
    manager
        .register("cache", recording_scope(&log, "cache"), true, 0)
        .unwrap();

    assert_eq!(manager.list_enabled(), vec!["database", "cache", "monitor"]);

    let mut stack = manager.enter_all().await.unwrap();
    stack.exit_all().await.unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "enter:database",
            "enter:cache",
            "enter:monitor",
            "exit:monitor",
            "exit:cache",
            "exit:database",
        ]
    );
}

#[tokio::test]
async fn test_manager_skips_disabled_scopes() {
    let log = new_log();
    let mut manager = LifespanManager::new();
    manager
        .register("kept", recording_scope(&log, "kept"), true, 0)
        .unwrap();
    manager
        .register("dormant", recording_scope(&log, "dormant"), false, 0)
        .unwrap();
    assert!(!manager.is_enabled("dormant"));

    manager.disable("kept").unwrap();
    manager.enable("dormant").unwrap();
    assert_eq!(manager.list_enabled(), vec!["dormant"]);

    let mut stack = manager.enter_all().await.unwrap();
    stack.exit_all().await.unwrap();
    assert_eq!(*log.lock(), vec!["enter:dormant", "exit:dormant"]);
}

#[tokio::test]
async fn test_manager_unwinds_on_enter_failure() {
    let log = new_log();
    let mut manager = LifespanManager::new();
    manager
        .register("first", recording_scope(&log, "first"), true, 0)
        .unwrap();
    manager
        .register("second", recording_scope(&log, "second"), true, 1)
        .unwrap();
    manager
        .register("broken", failing_enter_scope(&log, "broken"), true, 2)
        .unwrap();
    manager
        .register("never", recording_scope(&log, "never"), true, 3)
        .unwrap();

    match manager.enter_all().await {
        Err(ScopeError::Acquire { scope, cause }) => {
            assert_eq!(scope, "broken");
            assert!(cause.to_string().contains("refused"));
        }
        other => panic!("Expected acquire failure, got {:?}", other.map(|_| ())),
    }

    assert_eq!(
        *log.lock(),
        vec!["enter:first", "enter:second", "exit:second", "exit:first"]
    );
}

#[test]
fn test_manager_rejects_duplicates_and_unknown_names() {
    let log = new_log();
    let mut manager = LifespanManager::new();
    manager
        .register("only", recording_scope(&log, "only"), true, 0)
        .unwrap();

    assert!(matches!(
        manager.register("only", recording_scope(&log, "only"), true, 0),
        Err(ScopeError::DuplicateScope(name)) if name == "only"
    ));
    assert!(matches!(
        manager.enable("ghost"),
        Err(ScopeError::UnknownScope(name)) if name == "ghost"
    ));
    assert!(matches!(manager.disable("ghost"), Err(ScopeError::UnknownScope(_))));
    assert!(!manager.is_enabled("ghost"));

    assert_eq!(manager.len(), 1);
    manager.clear();
    assert!(manager.is_empty());
    assert!(manager.list_enabled().is_empty());
}

#[tokio::test]
async fn test_manager_with_no_scopes() {
    let manager = LifespanManager::new();
    let mut stack = manager.enter_all().await.unwrap();
    assert!(stack.is_empty());
    stack.exit_all().await.unwrap();
}

#[tokio::test]
async fn test_shared_scope_is_entered_once() {
    struct Counter {
        entered: AtomicUsize,
        exited: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Scope for Counter {
        async fn enter(&self) -> anyhow::Result<()> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn exit(&self) -> anyhow::Result<()> {
            self.exited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let counter = Arc::new(Counter {
        entered: AtomicUsize::new(0),
        exited: AtomicUsize::new(0),
    });
    let mut manager = LifespanManager::new();
    manager
        .register_shared("counter", counter.clone(), true, 0)
        .unwrap();

    let mut stack = manager.enter_all().await.unwrap();
    assert_eq!(counter.entered.load(Ordering::SeqCst), 1);
    assert_eq!(counter.exited.load(Ordering::SeqCst), 0);

    stack.exit_all().await.unwrap();
    assert_eq!(counter.exited.load(Ordering::SeqCst), 1);
}
