use super::*;
use crate::error::DiscoveryError;
use crate::events::{EventBus, EventFilter, LifecycleEvent};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

fn write(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn manifest(name: &str, deps: &[&str]) -> String {
    let deps: Vec<String> = deps.iter().map(|d| format!("\"{}\"", d)).collect();
    format!("name = \"{}\"\ndependencies = [{}]\n", name, deps.join(", "))
}

#[test]
fn test_target_walk_is_sorted_and_skips() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b/component.toml", &manifest("b", &[]));
    write(dir.path(), "a/component.toml", &manifest("a", &[]));
    write(dir.path(), "a/nested/component.toml", &manifest("nested", &[]));
    write(dir.path(), "target/component.toml", &manifest("built", &[]));
    write(dir.path(), "c/other.toml", &manifest("other", &[]));

    let target = SourceTarget::new(dir.path()).skip_dir("target");
    let locations = target.locations();

    assert_eq!(
        locations,
        vec![
            dir.path().join("a/component.toml"),
            dir.path().join("a/nested/component.toml"),
            dir.path().join("b/component.toml"),
        ]
    );
}

#[test]
fn test_target_any_manifest_and_skip_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "one.toml", &manifest("one", &[]));
    write(dir.path(), "two.toml", &manifest("two", &[]));
    write(dir.path(), "notes.txt", "not a manifest");

    let target = SourceTarget::new(dir.path())
        .any_manifest()
        .skip_file("two.toml");
    assert_eq!(target.locations(), vec![dir.path().join("one.toml")]);
}

#[test]
fn test_missing_directory_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let target = SourceTarget::new(dir.path().join("does-not-exist"));
    assert!(target.locations().is_empty());
}

#[test]
fn test_broken_location_is_skipped() {
    let dir = TempDir::new().unwrap();
    for name in ["alpha", "beta", "delta", "gamma"] {
        write(dir.path(), &format!("{}/component.toml", name), &manifest(name, &[]));
    }
    write(dir.path(), "broken/component.toml", "name = [unterminated");

    let events = EventBus::new(16);
    let mut receiver = events.subscribe_filtered(
        EventFilter::EventTypes(vec!["location_skipped"]),
        "test",
    );

    let locations = SourceTarget::new(dir.path()).locations();
    assert_eq!(locations.len(), 5);

    let discovery = Discovery::new(locations, ManifestLoader::default(), enabled_components)
        .with_events(events.clone());
    let mut scan = discovery.iter();
    let names: Vec<String> = scan.by_ref().map(|c| c.name().to_string()).collect();

    assert_eq!(names, vec!["alpha", "beta", "delta", "gamma"]);
    assert_eq!(scan.skipped(), 1);

    let skipped = receiver.drain();
    assert_eq!(skipped.len(), 1);
    match &skipped[0] {
        LifecycleEvent::LocationSkipped { location, .. } => {
            assert!(location.contains("broken"));
        }
        other => panic!("Expected LocationSkipped, got {:?}", other),
    }
}

#[test]
fn test_discovery_is_lazy_and_restartable() {
    let loads = Rc::new(Cell::new(0));
    let counter = Rc::clone(&loads);
    let loader = move |location: &Path| -> Result<Vec<String>, DiscoveryError> {
        counter.set(counter.get() + 1);
        Ok(vec![location.display().to_string()])
    };

    let discovery = Discovery::new(["one", "two", "three"], loader, |_: &String| true);
    assert_eq!(loads.get(), 0);

    let mut first = discovery.iter();
    assert_eq!(first.next().as_deref(), Some("one"));
    assert_eq!(loads.get(), 1);

    let all: Vec<String> = discovery.iter().collect();
    assert_eq!(all, vec!["one", "two", "three"]);
    assert_eq!(loads.get(), 4);

    let again: Vec<String> = (&discovery).into_iter().collect();
    assert_eq!(again, all);
}

#[test]
fn test_predicate_filters_values() {
    let loader = |_: &Path| -> Result<Vec<u32>, DiscoveryError> { Ok(vec![1, 2, 3, 4]) };
    let even = discover(["a", "b"], loader, |n: &u32| n % 2 == 0);
    assert_eq!(even, vec![2, 4, 2, 4]);
}

#[test]
fn test_manifest_fields_and_defaults() {
    let manifests = ComponentManifest::from_toml(
        r#"
        name = "api"
        dependencies = ["db", "cache"]
        priority = 5
        "#,
    )
    .unwrap();

    assert_eq!(manifests.len(), 1);
    let api = &manifests[0];
    assert_eq!(api.name, "api");
    assert_eq!(api.dependencies, vec!["db", "cache"]);
    assert_eq!(api.priority, 5);
    assert!(api.enabled);
    assert_eq!(api.kind, "noop");
    assert!(api.command.is_none());
}

#[test]
fn test_manifest_component_array() {
    let manifests = ComponentManifest::from_toml(
        r#"
        [[component]]
        name = "db"

        [[component]]
        name = "cache"
        enabled = false
        "#,
    )
    .unwrap();

    let names: Vec<&str> = manifests.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["db", "cache"]);
    assert!(!manifests[1].enabled);
}

#[test]
fn test_manifest_rejects_unknown_fields() {
    assert!(ComponentManifest::from_toml("name = \"x\"\ndepends = [\"y\"]\n").is_err());
    assert!(ComponentManifest::from_toml("priority = 1\n").is_err());
}

#[test]
fn test_loader_builds_descriptor() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "api/component.toml",
        "name = \"api\"\ndependencies = [\"db\", \"db\"]\npriority = -2\n",
    );

    let loaded = ManifestLoader::default().load(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    let descriptor = loaded[0].descriptor.clone();
    assert_eq!(descriptor.name(), "api");
    assert_eq!(descriptor.dependencies(), &["db".to_string()]);
    assert_eq!(descriptor.priority(), -2);
    assert_eq!(descriptor.source(), Some(path.as_path()));
}

#[test]
fn test_loader_errors_name_the_location() {
    let dir = TempDir::new().unwrap();
    let loader = ManifestLoader::default();

    let missing = dir.path().join("missing.toml");
    match loader.load(&missing) {
        Err(DiscoveryError::Io { location, .. }) => assert_eq!(location, missing),
        other => panic!("Expected Io error, got {:?}", other.map(|v| v.len())),
    }

    let unknown = write(dir.path(), "unknown.toml", "name = \"x\"\nkind = \"teleporter\"\n");
    match loader.load(&unknown) {
        Err(DiscoveryError::UnknownKind { kind, .. }) => assert_eq!(kind, "teleporter"),
        other => panic!("Expected UnknownKind, got {:?}", other.map(|v| v.len())),
    }

    let incomplete = write(dir.path(), "incomplete.toml", "name = \"x\"\nkind = \"command\"\n");
    let err = loader.load(&incomplete).unwrap_err();
    assert!(matches!(err, DiscoveryError::Factory { .. }));
    assert_eq!(err.location(), Some(&incomplete));
}

#[test]
fn test_custom_hook_kind() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "component.toml", "name = \"custom\"\nkind = \"custom\"\n");

    let mut factory = HookFactory::new();
    factory.register("custom", |manifest, _| {
        assert_eq!(manifest.name, "custom");
        Ok(std::sync::Arc::new(crate::component::NoopHooks)
            as std::sync::Arc<dyn crate::component::ComponentHooks>)
    });
    assert_eq!(factory.kinds(), vec!["custom"]);

    let loaded = ManifestLoader::new(factory).load(&path).unwrap();
    assert_eq!(loaded[0].name(), "custom");
    assert!(ManifestLoader::new(HookFactory::new()).load(&path).is_err());
}

#[test]
fn test_discover_components_skips_disabled() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "db/component.toml", &manifest("db", &[]));
    write(
        dir.path(),
        "legacy/component.toml",
        "name = \"legacy\"\nenabled = false\n",
    );

    let registry = discover_components(
        &[SourceTarget::new(dir.path())],
        ManifestLoader::default(),
        enabled_components,
        DuplicatePolicy::Warn,
        &EventBus::default(),
    )
    .unwrap();

    assert_eq!(registry.list(), vec!["db"]);
}

#[test]
fn test_duplicate_last_wins_with_warning() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/component.toml", "name = \"db\"\npriority = 1\n");
    write(dir.path(), "b/component.toml", "name = \"db\"\npriority = 2\n");

    let events = EventBus::new(16);
    let mut receiver = events.subscribe_filtered(
        EventFilter::EventTypes(vec!["duplicate_component"]),
        "test",
    );

    let registry = discover_components(
        &[SourceTarget::new(dir.path())],
        ManifestLoader::default(),
        enabled_components,
        DuplicatePolicy::Warn,
        &events,
    )
    .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("db").unwrap().priority(), 2);

    let duplicates = receiver.drain();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].component(), Some("db"));
}

#[test]
fn test_duplicate_error_policy() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/component.toml", &manifest("db", &[]));
    write(dir.path(), "b/component.toml", &manifest("db", &[]));

    let result = discover_components(
        &[SourceTarget::new(dir.path())],
        ManifestLoader::default(),
        enabled_components,
        DuplicatePolicy::Error,
        &EventBus::default(),
    );

    match result {
        Err(DiscoveryError::DuplicateComponent { name, location }) => {
            assert_eq!(name, "db");
            assert!(location.ends_with("b/component.toml"));
        }
        other => panic!("Expected duplicate error, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_discovered_set_resolves() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "api/component.toml", &manifest("api", &["auth", "db"]));
    write(dir.path(), "auth/component.toml", &manifest("auth", &["db"]));
    write(dir.path(), "db/component.toml", &manifest("db", &[]));

    let registry = discover_components(
        &[SourceTarget::new(dir.path())],
        ManifestLoader::default(),
        enabled_components,
        DuplicatePolicy::default(),
        &EventBus::default(),
    )
    .unwrap();

    let order = registry.resolve(crate::graph::TieBreak::DiscoveryOrder).unwrap();
    assert_eq!(order.start_order(), &["db", "auth", "api"]);
}
