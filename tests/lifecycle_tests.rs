//! Region lifecycle: start, stop, teardown and reader-visible absence

use tempfile::TempDir;

use shmstats::{
    MetricType, RegionSnapshot, Registry, RegistryFlags, Semantics, ShmStatsError, Units,
};

fn simple_registry(flags: RegistryFlags) -> Registry {
    let mut registry = Registry::new("app", 1, flags);
    registry
        .add_metric(
            "requests",
            1,
            MetricType::U64,
            Semantics::Counter,
            Units::count(),
            None,
            None,
            None,
        )
        .unwrap();
    registry
}

#[test]
fn test_start_creates_backing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.shmstats");
    let mapped = simple_registry(RegistryFlags::default()).start(&path).unwrap();
    assert!(mapped.is_active());
    assert_eq!(mapped.path(), Some(path.as_path()));
    assert!(path.exists());
}

#[test]
fn test_start_fails_on_empty_catalog() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.shmstats");
    let registry = Registry::new("app", 1, RegistryFlags::default());
    let err = registry.start(&path).unwrap_err();
    assert!(matches!(err, ShmStatsError::Validation { .. }));
    // Planning failed before any storage was created
    assert!(!path.exists());
}

#[test]
fn test_start_fails_on_bad_path() {
    let registry = simple_registry(RegistryFlags::default());
    let err = registry
        .start("/nonexistent-dir/definitely/not/here.shmstats")
        .unwrap_err();
    assert!(matches!(err, ShmStatsError::Resource { .. }));
}

#[test]
fn test_stop_removes_backing_file_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.shmstats");
    let mut mapped = simple_registry(RegistryFlags::default()).start(&path).unwrap();
    assert!(path.exists());

    mapped.stop();
    assert!(!mapped.is_active());
    assert!(!path.exists());

    // Stopping again is a no-op
    mapped.stop();
    assert!(!mapped.is_active());
}

#[test]
fn test_operations_after_stop_report_invalid_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.shmstats");
    let mut mapped = simple_registry(RegistryFlags::default()).start(&path).unwrap();
    let handle = mapped.lookup("requests", None).unwrap();
    mapped.stop();

    assert!(matches!(
        mapped.increment(&handle, 1.0),
        Err(ShmStatsError::InvalidState { .. })
    ));
    assert!(matches!(
        mapped.lookup("requests", None),
        Err(ShmStatsError::InvalidState { .. })
    ));
}

#[test]
fn test_drop_cleans_up_like_stop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.shmstats");
    {
        let _mapped = simple_registry(RegistryFlags::default()).start(&path).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[test]
fn test_reader_sees_absence_as_normal_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.shmstats");
    let err = RegionSnapshot::read(&path).unwrap_err();
    assert!(err.is_region_absent());

    // After a start/stop cycle the reader is back to the same state
    let mut mapped = simple_registry(RegistryFlags::default()).start(&path).unwrap();
    assert!(RegionSnapshot::read(&path).is_ok());
    mapped.stop();
    let err = RegionSnapshot::read(&path).unwrap_err();
    assert!(err.is_region_absent());
}

#[test]
fn test_process_check_flag_publishes_pid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pid.shmstats");
    let flags = RegistryFlags {
        process_check: true,
        ..Default::default()
    };
    let _mapped = simple_registry(flags).start(&path).unwrap();

    let snapshot = RegionSnapshot::read(&path).unwrap();
    assert!(snapshot.flags.process_check);
    assert_eq!(snapshot.pid, std::process::id());
}

#[test]
fn test_independent_registries_coexist() {
    let dir = TempDir::new().unwrap();
    let a_path = dir.path().join("a.shmstats");
    let b_path = dir.path().join("b.shmstats");

    let a = simple_registry(RegistryFlags::default()).start(&a_path).unwrap();
    let mut registry = Registry::new("other", 2, RegistryFlags::default());
    registry
        .add_metric(
            "errors",
            1,
            MetricType::U32,
            Semantics::Counter,
            Units::count(),
            None,
            None,
            None,
        )
        .unwrap();
    let b = registry.start(&b_path).unwrap();

    a.inc("requests", None).unwrap();
    b.inc("errors", None).unwrap();

    assert_eq!(RegionSnapshot::read(&a_path).unwrap().cluster, 1);
    assert_eq!(RegionSnapshot::read(&b_path).unwrap().cluster, 2);
}

#[test]
fn test_concurrent_writer_threads_keep_region_consistent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("threads.shmstats");

    let mut registry = Registry::new("app", 1, RegistryFlags::default());
    registry
        .add_metric(
            "requests",
            1,
            MetricType::U64,
            Semantics::Counter,
            Units::count(),
            None,
            None,
            None,
        )
        .unwrap();
    registry
        .add_metric(
            "status",
            2,
            MetricType::String,
            Semantics::Discrete,
            Units::NONE,
            None,
            None,
            None,
        )
        .unwrap();
    let mapped = std::sync::Arc::new(registry.start(&path).unwrap());

    let mut threads = Vec::new();
    for t in 0..4 {
        let mapped = std::sync::Arc::clone(&mapped);
        threads.push(std::thread::spawn(move || {
            for i in 0..250 {
                mapped.inc("requests", None).unwrap();
                if i % 50 == 0 {
                    mapped
                        .set_string_named("status", None, &format!("worker-{}", t))
                        .unwrap();
                }
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    let snapshot = RegionSnapshot::read(&path).unwrap();
    assert_eq!(
        snapshot.metric("requests").unwrap().singleton().unwrap().as_u64(),
        1000
    );
    let status = snapshot.metric("status").unwrap().singleton().unwrap();
    assert!(status.string.as_deref().unwrap().starts_with("worker-"));
}
