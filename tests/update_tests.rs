//! Update primitive and handle cache behavior

use std::time::Duration;

use tempfile::TempDir;

use shmstats::{
    units, MetricType, RegionSnapshot, Registry, RegistryFlags, Semantics, ShmStatsError, Units,
};

struct Fixture {
    // Declared before _dir so the region tears down while its directory
    // still exists
    mapped: shmstats::MappedRegistry,
    path: std::path::PathBuf,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("updates.shmstats");

    let mut registry = Registry::new("app", 1, RegistryFlags::default());
    registry.add_indom(1, Some("cpus"), None).unwrap();
    registry.add_instance(1, 0, "cpu0").unwrap();
    registry.add_instance(1, 1, "cpu1").unwrap();
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
            "temperature",
            2,
            MetricType::Double,
            Semantics::Instant,
            Units::NONE,
            None,
            None,
            None,
        )
        .unwrap();
    registry
        .add_metric(
            "busy_time",
            3,
            MetricType::Elapsed,
            Semantics::Counter,
            Units::time(units::SCALE_USEC),
            Some(1),
            None,
            None,
        )
        .unwrap();
    registry
        .add_metric(
            "status",
            4,
            MetricType::String,
            Semantics::Discrete,
            Units::NONE,
            None,
            None,
            None,
        )
        .unwrap();
    registry
        .add_metric(
            "requests_total",
            5,
            MetricType::U64,
            Semantics::Counter,
            Units::count(),
            None,
            None,
            None,
        )
        .unwrap();

    let mapped = registry.start(&path).unwrap();
    Fixture {
        mapped,
        path,
        _dir: dir,
    }
}

#[test]
fn test_increment_accumulates_in_any_order() {
    let f = fixture();
    let handle = f.mapped.lookup("requests", None).unwrap();
    for delta in [3.0, 1.0, 2.0] {
        f.mapped.increment(&handle, delta).unwrap();
    }
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    assert_eq!(
        snapshot.metric("requests").unwrap().singleton().unwrap().as_u64(),
        6
    );
}

#[test]
fn test_set_overwrites_floats() {
    let f = fixture();
    let handle = f.mapped.lookup("temperature", None).unwrap();
    f.mapped.set(&handle, 21.5).unwrap();
    f.mapped.set(&handle, 23.25).unwrap();
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    let value = snapshot.metric("temperature").unwrap().singleton().unwrap();
    assert_eq!(value.as_f64(MetricType::Double), 23.25);
}

#[test]
fn test_lookup_is_stable_and_cached() {
    let f = fixture();
    let first = f.mapped.lookup("requests", None).unwrap();
    let second = f.mapped.lookup("requests", None).unwrap();
    assert_eq!(first, second);

    let cpu0 = f.mapped.lookup("busy_time", Some("cpu0")).unwrap();
    let cpu0_again = f.mapped.lookup("busy_time", Some("cpu0")).unwrap();
    assert_eq!(cpu0, cpu0_again);
    let cpu1 = f.mapped.lookup("busy_time", Some("cpu1")).unwrap();
    assert_ne!(cpu0, cpu1);
}

#[test]
fn test_lookup_errors() {
    let f = fixture();
    assert!(matches!(
        f.mapped.lookup("nope", None),
        Err(ShmStatsError::NotFound { kind: "metric", .. })
    ));
    assert!(matches!(
        f.mapped.lookup("busy_time", Some("cpu9")),
        Err(ShmStatsError::NotFound {
            kind: "instance",
            ..
        })
    ));
    // Instanced metric without an instance name
    assert!(f.mapped.lookup("busy_time", None).is_err());
    // Singleton with an instance name
    assert!(f.mapped.lookup("requests", Some("cpu0")).is_err());
}

#[test]
fn test_type_mismatch_on_string_metric() {
    let f = fixture();
    let handle = f.mapped.lookup("status", None).unwrap();
    assert!(matches!(
        f.mapped.increment(&handle, 1.0),
        Err(ShmStatsError::TypeMismatch { .. })
    ));
    let numeric = f.mapped.lookup("requests", None).unwrap();
    assert!(matches!(
        f.mapped.set_string(&numeric, "x", 8),
        Err(ShmStatsError::TypeMismatch { .. })
    ));
}

#[test]
fn test_set_string_truncates_and_terminates() {
    let f = fixture();
    let handle = f.mapped.lookup("status", None).unwrap();
    f.mapped.set_string(&handle, "degraded-but-running", 8).unwrap();
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    let value = snapshot.metric("status").unwrap().singleton().unwrap();
    assert_eq!(value.string.as_deref(), Some("degraded"));
    assert_eq!(value.extra, 8);

    // Shrinking leaves no tail of the longer previous value
    f.mapped.set_string(&handle, "ok", 64).unwrap();
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    let value = snapshot.metric("status").unwrap().singleton().unwrap();
    assert_eq!(value.string.as_deref(), Some("ok"));
}

#[test]
fn test_interval_accumulates_only_target_instance() {
    let f = fixture();
    let timer = f.mapped.interval_start("busy_time", Some("cpu0")).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    f.mapped.interval_end(timer).unwrap();

    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    let busy = snapshot.metric("busy_time").unwrap();
    let cpu0_us = busy.value_for("cpu0").unwrap().as_u64();
    // At least the slept duration, in microseconds, with headroom for
    // scheduling delay
    assert!(cpu0_us >= 20_000, "elapsed {}us", cpu0_us);
    assert!(cpu0_us < 5_000_000);
    assert_eq!(busy.value_for("cpu1").unwrap().as_u64(), 0);
}

#[test]
fn test_interval_end_requires_matching_start() {
    let f = fixture();
    let timer = f.mapped.interval_start("busy_time", Some("cpu0")).unwrap();
    // A newer start supersedes the old timer
    let newer = f.mapped.interval_start("busy_time", Some("cpu0")).unwrap();
    assert!(matches!(
        f.mapped.interval_end(timer),
        Err(ShmStatsError::InvalidState { .. })
    ));
    // The superseding timer still ends cleanly
    f.mapped.interval_end(newer).unwrap();

    // Value was mutated only by the successful end
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    let busy = snapshot.metric("busy_time").unwrap();
    assert_eq!(busy.value_for("cpu0").unwrap().extra, 0);
}

#[test]
fn test_interval_requires_elapsed_type() {
    let f = fixture();
    assert!(matches!(
        f.mapped.interval_start("requests", None),
        Err(ShmStatsError::TypeMismatch { .. })
    ));
}

#[test]
fn test_fallback_uses_secondary_when_primary_missing() {
    let f = fixture();
    f.mapped
        .add_fallback("requests_detailed", "requests_total", None, 4.0)
        .unwrap();
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    assert_eq!(
        snapshot.metric("requests_total").unwrap().singleton().unwrap().as_u64(),
        4
    );
}

#[test]
fn test_fallback_prefers_primary() {
    let f = fixture();
    f.mapped
        .add_fallback("requests", "requests_total", None, 2.0)
        .unwrap();
    let snapshot = RegionSnapshot::read(&f.path).unwrap();
    assert_eq!(
        snapshot.metric("requests").unwrap().singleton().unwrap().as_u64(),
        2
    );
    assert_eq!(
        snapshot.metric("requests_total").unwrap().singleton().unwrap().as_u64(),
        0
    );
}

#[test]
fn test_fallback_rejects_mismatched_shapes() {
    let f = fixture();
    // requests is a singleton, busy_time is instanced
    assert!(matches!(
        f.mapped.inc_fallback("requests", "busy_time", None),
        Err(ShmStatsError::Validation { .. })
    ));
}

#[test]
fn test_fallback_not_found_when_neither_exists() {
    let f = fixture();
    assert!(matches!(
        f.mapped.inc_fallback("nope", "also_nope", None),
        Err(ShmStatsError::NotFound { .. })
    ));
}
