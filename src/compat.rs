//! Legacy static-array catalog front end
//!
//! Older call sites assemble their whole catalog at compile time as two
//! arrays instead of incremental builder calls. This shim validates those
//! arrays with the same rules as the builder and feeds them through the
//! same planner and writer, so an equivalent catalog produces a
//! byte-for-byte identical region.

use std::path::Path;

use crate::catalog::{MetricType, Registry, RegistryFlags, Semantics};
use crate::error::Result;
use crate::region::MappedRegistry;
use crate::units::Units;

/// Compile-time instance declaration
#[derive(Debug, Clone, Copy)]
pub struct InstanceSpec {
    pub internal: i32,
    pub external: &'static str,
}

/// Compile-time instance domain declaration
#[derive(Debug, Clone, Copy)]
pub struct IndomSpec {
    pub serial: u32,
    pub instances: &'static [InstanceSpec],
    pub shorttext: Option<&'static str>,
    pub helptext: Option<&'static str>,
}

/// Compile-time metric declaration
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub item: u32,
    pub mtype: MetricType,
    pub semantics: Semantics,
    pub units: Units,
    /// Instance domain serial, None for singleton metrics
    pub indom: Option<u32>,
    pub shorttext: Option<&'static str>,
    pub helptext: Option<&'static str>,
}

/// Build a registry from static arrays and start it at `path`
///
/// Array order is declaration order, so a builder-based catalog declaring
/// the same domains and metrics in the same order serializes to the same
/// bytes.
pub fn start_from_specs(
    path: impl AsRef<Path>,
    identity: &str,
    cluster: u32,
    flags: RegistryFlags,
    metrics: &[MetricSpec],
    indoms: &[IndomSpec],
) -> Result<MappedRegistry> {
    let registry = registry_from_specs(identity, cluster, flags, metrics, indoms)?;
    registry.start(path)
}

/// Validate static arrays into a normal builder registry
pub fn registry_from_specs(
    identity: &str,
    cluster: u32,
    flags: RegistryFlags,
    metrics: &[MetricSpec],
    indoms: &[IndomSpec],
) -> Result<Registry> {
    let mut registry = Registry::new(identity, cluster, flags);
    for indom in indoms {
        registry.add_indom(indom.serial, indom.shorttext, indom.helptext)?;
        for instance in indom.instances {
            registry.add_instance(indom.serial, instance.internal, instance.external)?;
        }
    }
    for metric in metrics {
        registry.add_metric(
            metric.name,
            metric.item,
            metric.mtype,
            metric.semantics,
            metric.units,
            metric.indom,
            metric.shorttext,
            metric.helptext,
        )?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    static CPUS: &[InstanceSpec] = &[
        InstanceSpec {
            internal: 0,
            external: "cpu0",
        },
        InstanceSpec {
            internal: 1,
            external: "cpu1",
        },
    ];

    static INDOMS: &[IndomSpec] = &[IndomSpec {
        serial: 1,
        instances: CPUS,
        shorttext: Some("cpus"),
        helptext: None,
    }];

    static METRICS: &[MetricSpec] = &[MetricSpec {
        name: "busy",
        item: 1,
        mtype: MetricType::U64,
        semantics: Semantics::Counter,
        units: Units::NONE,
        indom: Some(1),
        shorttext: None,
        helptext: None,
    }];

    #[test]
    fn test_specs_validate_like_builder() {
        let registry =
            registry_from_specs("app", 3, RegistryFlags::default(), METRICS, INDOMS).unwrap();
        assert_eq!(registry.metrics().len(), 1);
        assert_eq!(registry.indoms()[0].instances.len(), 2);
    }

    #[test]
    fn test_specs_reject_duplicates() {
        static DUPES: &[MetricSpec] = &[
            MetricSpec {
                name: "m",
                item: 1,
                mtype: MetricType::U64,
                semantics: Semantics::Counter,
                units: Units::NONE,
                indom: None,
                shorttext: None,
                helptext: None,
            },
            MetricSpec {
                name: "m",
                item: 2,
                mtype: MetricType::U64,
                semantics: Semantics::Counter,
                units: Units::NONE,
                indom: None,
                shorttext: None,
                helptext: None,
            },
        ];
        assert!(registry_from_specs("app", 1, RegistryFlags::default(), DUPES, &[]).is_err());
    }
}
