//! Layout planning for a finished catalog
//!
//! `plan` is a pure function from catalog to byte layout. It is the single
//! source of truth for element ordering, so the incremental builder and the
//! legacy static-array front end serialize byte-identical regions for
//! equivalent catalogs.

use crate::catalog::{MetricType, Registry};
use crate::error::{Result, ShmStatsError};

use super::constants::*;
use super::headers::*;

/// Geometry of one region section
#[derive(Debug, Clone, Copy)]
pub struct SectionPlan {
    pub section: u32,
    pub offset: u64,
    pub count: u32,
    pub stride: u32,
}

/// Placement of one value slot
#[derive(Debug, Clone, Copy)]
pub struct ValuePlan {
    /// Index into the registry's metric list
    pub metric_idx: usize,
    /// Global instance index (across all domains), None for singletons
    pub instance_idx: Option<usize>,
    /// String slot index backing a string metric's payload
    pub string_idx: Option<u32>,
}

/// Placement of one instance in the global instance section
#[derive(Debug, Clone, Copy)]
pub struct InstancePlan {
    /// Index into the registry's indom list
    pub indom_idx: usize,
    /// Index within the domain's instance list
    pub member_idx: usize,
}

/// Help-text string slot assignments for one descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpPlan {
    pub shorttext: Option<u32>,
    pub helptext: Option<u32>,
}

/// Complete byte layout of a region for one catalog
#[derive(Debug, Clone)]
pub struct RegionLayout {
    pub total_size: u64,
    pub indoms: SectionPlan,
    pub instances: SectionPlan,
    pub metrics: SectionPlan,
    pub values: SectionPlan,
    pub strings: SectionPlan,
    pub labels: SectionPlan,
    /// Global instance ordering: grouped by domain, declaration order
    pub instance_plans: Vec<InstancePlan>,
    /// Value slot ordering: per metric, singleton or one per instance
    pub value_plans: Vec<ValuePlan>,
    /// Help string slots per indom, same order as the catalog
    pub indom_help: Vec<HelpPlan>,
    /// Help string slots per metric, same order as the catalog
    pub metric_help: Vec<HelpPlan>,
}

impl RegionLayout {
    pub fn indom_offset(&self, idx: usize) -> u64 {
        self.indoms.offset + (idx as u64) * INDOM_STRIDE as u64
    }

    pub fn instance_offset(&self, global_idx: usize) -> u64 {
        self.instances.offset + (global_idx as u64) * INSTANCE_STRIDE as u64
    }

    pub fn metric_offset(&self, idx: usize) -> u64 {
        self.metrics.offset + (idx as u64) * METRIC_STRIDE as u64
    }

    pub fn value_offset(&self, idx: usize) -> u64 {
        self.values.offset + (idx as u64) * VALUE_STRIDE as u64
    }

    pub fn string_offset(&self, idx: u32) -> u64 {
        self.strings.offset + (idx as u64) * STRING_STRIDE as u64
    }

    pub fn label_offset(&self, idx: usize) -> u64 {
        self.labels.offset + (idx as u64) * LABEL_STRIDE as u64
    }

    /// TOC entries in section-id order
    pub fn toc(&self) -> [SectionPlan; TOC_ENTRIES] {
        [
            self.indoms,
            self.instances,
            self.metrics,
            self.values,
            self.strings,
            self.labels,
        ]
    }
}

/// Compute the exact layout for a finished catalog
pub fn plan(registry: &Registry) -> Result<RegionLayout> {
    if registry.metrics().is_empty() {
        return Err(ShmStatsError::validation("no metrics declared"));
    }

    // Resolve deferred indom references and reject empty referenced domains
    for metric in registry.metrics() {
        if let Some(serial) = metric.indom {
            let domain = registry.indom(serial).ok_or_else(|| {
                ShmStatsError::validation(format!(
                    "metric '{}' references undefined instance domain {}",
                    metric.name, serial
                ))
            })?;
            if domain.instances.is_empty() {
                return Err(ShmStatsError::validation(format!(
                    "metric '{}' references instance domain {} with no instances",
                    metric.name, serial
                )));
            }
        }
    }

    // Global instance ordering: grouped by domain, declaration order
    let mut instance_plans = Vec::new();
    for (indom_idx, domain) in registry.indoms().iter().enumerate() {
        for member_idx in 0..domain.instances.len() {
            instance_plans.push(InstancePlan {
                indom_idx,
                member_idx,
            });
        }
    }

    // String slots are handed out in a fixed order: indom help texts, then
    // metric help texts, then string-metric value payloads.
    let mut string_count: u32 = 0;
    let mut next_string = || {
        let idx = string_count;
        string_count += 1;
        idx
    };

    let indom_help: Vec<HelpPlan> = registry
        .indoms()
        .iter()
        .map(|d| HelpPlan {
            shorttext: d.shorttext.as_ref().map(|_| next_string()),
            helptext: d.helptext.as_ref().map(|_| next_string()),
        })
        .collect();

    let metric_help: Vec<HelpPlan> = registry
        .metrics()
        .iter()
        .map(|m| HelpPlan {
            shorttext: m.shorttext.as_ref().map(|_| next_string()),
            helptext: m.helptext.as_ref().map(|_| next_string()),
        })
        .collect();

    // Value slots: one per singleton metric, one per (metric, instance)
    // for instanced metrics, in metric declaration order.
    let mut value_plans = Vec::new();
    for (metric_idx, metric) in registry.metrics().iter().enumerate() {
        match metric.indom {
            None => {
                let string_idx =
                    (metric.mtype == MetricType::String).then(&mut next_string);
                value_plans.push(ValuePlan {
                    metric_idx,
                    instance_idx: None,
                    string_idx,
                });
            }
            Some(serial) => {
                let indom_idx = registry
                    .indoms()
                    .iter()
                    .position(|d| d.serial == serial)
                    .expect("indom resolved above");
                for (global_idx, iplan) in instance_plans.iter().enumerate() {
                    if iplan.indom_idx != indom_idx {
                        continue;
                    }
                    let string_idx =
                        (metric.mtype == MetricType::String).then(&mut next_string);
                    value_plans.push(ValuePlan {
                        metric_idx,
                        instance_idx: Some(global_idx),
                        string_idx,
                    });
                }
            }
        }
    }

    // Section geometry, in fixed order after header and TOC
    let mut offset = (HEADER_SIZE + TOC_ENTRIES * TOC_STRIDE) as u64;
    let mut section = |id: u32, count: usize, stride: usize| {
        let plan = SectionPlan {
            section: id,
            offset,
            count: count as u32,
            stride: stride as u32,
        };
        offset += (count * stride) as u64;
        plan
    };

    let indoms = section(section::INDOMS, registry.indoms().len(), INDOM_STRIDE);
    let instances = section(section::INSTANCES, instance_plans.len(), INSTANCE_STRIDE);
    let metrics = section(section::METRICS, registry.metrics().len(), METRIC_STRIDE);
    let values = section(section::VALUES, value_plans.len(), VALUE_STRIDE);
    let strings = section(section::STRINGS, string_count as usize, STRING_STRIDE);
    let labels = section(section::LABELS, registry.labels().len(), LABEL_STRIDE);

    let total_size = offset;
    if total_size > u32::MAX as u64 {
        return Err(ShmStatsError::validation(format!(
            "region size {} exceeds the 32-bit extent limit",
            total_size
        )));
    }

    Ok(RegionLayout {
        total_size,
        indoms,
        instances,
        metrics,
        values,
        strings,
        labels,
        instance_plans,
        value_plans,
        indom_help,
        metric_help,
    })
}
