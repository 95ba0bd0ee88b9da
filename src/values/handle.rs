//! Name-to-slot resolution with memoization
//!
//! Resolving a (metric, instance) pair walks the committed catalog once;
//! the resulting handle is cached so hot-path callers looking up by name
//! pay the walk only on first use.

use crate::catalog::MetricType;
use crate::error::{Result, ShmStatsError};
use crate::region::MappedRegistry;

/// A stable reference to one value slot inside the mapped region
///
/// Handles stay valid for the whole life of the region; repeated lookups
/// of the same pair return the same slot offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHandle {
    /// Metric name, kept for error reporting
    pub(crate) metric_name: String,
    /// Byte offset of the ValueBlock
    pub(crate) offset: u64,
    pub(crate) mtype: MetricType,
    /// Byte offset of the backing string slot, 0 for numeric metrics
    pub(crate) string_offset: u64,
}

impl ValueHandle {
    /// Declared type of the underlying metric
    pub fn metric_type(&self) -> MetricType {
        self.mtype
    }

    /// Name of the underlying metric
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }
}

impl MappedRegistry {
    /// Resolve a (metric, instance) pair to its value slot
    ///
    /// Singleton metrics take no instance name; metrics bound to an
    /// instance domain require one. Results are memoized per pair.
    pub fn lookup(&self, metric: &str, instance: Option<&str>) -> Result<ValueHandle> {
        self.active_base()?;

        let key = (metric.to_owned(), instance.map(str::to_owned));
        if let Some(handle) = self.handles.lock().unwrap().get(&key) {
            return Ok(handle.clone());
        }

        let handle = self.resolve(metric, instance)?;
        self.handles.lock().unwrap().insert(key, handle.clone());
        Ok(handle)
    }

    fn resolve(&self, metric: &str, instance: Option<&str>) -> Result<ValueHandle> {
        let metric_idx = self
            .registry
            .metrics()
            .iter()
            .position(|m| m.name == metric)
            .ok_or_else(|| ShmStatsError::metric_not_found(metric))?;
        let descriptor = &self.registry.metrics()[metric_idx];

        let instance_idx = match (descriptor.indom, instance) {
            (None, None) => None,
            (None, Some(name)) => {
                return Err(ShmStatsError::validation(format!(
                    "metric '{}' is a singleton, instance '{}' not applicable",
                    metric, name
                )))
            }
            (Some(serial), None) => {
                return Err(ShmStatsError::validation(format!(
                    "metric '{}' is bound to instance domain {}, instance name required",
                    metric, serial
                )))
            }
            (Some(serial), Some(name)) => {
                let indom_idx = self
                    .registry
                    .indoms()
                    .iter()
                    .position(|d| d.serial == serial)
                    .expect("indom validated at plan time");
                let member_idx = self.registry.indoms()[indom_idx]
                    .instances
                    .iter()
                    .position(|i| i.external == name)
                    .ok_or_else(|| ShmStatsError::instance_not_found(name))?;
                Some(
                    self.layout
                        .instance_plans
                        .iter()
                        .position(|p| p.indom_idx == indom_idx && p.member_idx == member_idx)
                        .expect("instance placed at plan time"),
                )
            }
        };

        let value_idx = self
            .layout
            .value_plans
            .iter()
            .position(|p| p.metric_idx == metric_idx && p.instance_idx == instance_idx)
            .expect("value slot placed at plan time");
        let plan = &self.layout.value_plans[value_idx];

        Ok(ValueHandle {
            metric_name: descriptor.name.clone(),
            offset: self.layout.value_offset(value_idx),
            mtype: descriptor.mtype,
            string_offset: plan
                .string_idx
                .map(|idx| self.layout.string_offset(idx))
                .unwrap_or(0),
        })
    }
}
