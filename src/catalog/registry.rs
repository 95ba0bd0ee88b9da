//! Registry builder with catalog validation
//!
//! All add operations validate eagerly and leave the catalog untouched on
//! failure. Instance domain references from metrics are deferred: the domain
//! need not exist when the metric is added, only by plan time.

use crate::error::{Result, ShmStatsError};
use crate::layout::constants::{LABEL_MAX, NAME_MAX};
use crate::units::Units;

use super::types::{
    Instance, InstanceDomain, LabelEntry, LabelTarget, MetricDescriptor, MetricType,
    RegistryFlags, Semantics,
};

/// The complete pre-commit catalog for one shared region
///
/// Mutable while being built, single-threaded; committed to a region by
/// [`Registry::start`](crate::region::writer) after which the region's copy
/// never changes.
#[derive(Debug, Clone)]
pub struct Registry {
    identity: String,
    cluster: u32,
    flags: RegistryFlags,
    metrics: Vec<MetricDescriptor>,
    indoms: Vec<InstanceDomain>,
    labels: Vec<LabelEntry>,
}

impl Registry {
    /// Create an empty catalog
    ///
    /// `identity` names the declaring application, `cluster` namespaces the
    /// metric ids across independently built registries in one process.
    pub fn new(identity: impl Into<String>, cluster: u32, flags: RegistryFlags) -> Self {
        Self {
            identity: identity.into(),
            cluster,
            flags,
            metrics: Vec::new(),
            indoms: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Declare a metric
    ///
    /// Returns the item id on success. The indom serial, if any, is checked
    /// against the declared domains at plan time, not here.
    #[allow(clippy::too_many_arguments)]
    pub fn add_metric(
        &mut self,
        name: impl Into<String>,
        item: u32,
        mtype: MetricType,
        semantics: Semantics,
        units: Units,
        indom: Option<u32>,
        shorttext: Option<&str>,
        helptext: Option<&str>,
    ) -> Result<u32> {
        let name = name.into();
        validate_name("metric name", &name)?;
        units.validate()?;
        if self.metrics.iter().any(|m| m.name == name) {
            return Err(ShmStatsError::validation(format!(
                "duplicate metric name '{}'",
                name
            )));
        }
        if self.metrics.iter().any(|m| m.item == item) {
            return Err(ShmStatsError::validation(format!(
                "duplicate metric item id {}",
                item
            )));
        }
        self.metrics.push(MetricDescriptor {
            name,
            item,
            mtype,
            semantics,
            units,
            indom,
            shorttext: shorttext.map(str::to_owned),
            helptext: helptext.map(str::to_owned),
        });
        Ok(item)
    }

    /// Declare an instance domain
    pub fn add_indom(
        &mut self,
        serial: u32,
        shorttext: Option<&str>,
        helptext: Option<&str>,
    ) -> Result<u32> {
        if self.indoms.iter().any(|d| d.serial == serial) {
            return Err(ShmStatsError::validation(format!(
                "duplicate instance domain serial {}",
                serial
            )));
        }
        self.indoms.push(InstanceDomain {
            serial,
            instances: Vec::new(),
            shorttext: shorttext.map(str::to_owned),
            helptext: helptext.map(str::to_owned),
        });
        Ok(serial)
    }

    /// Add an instance to an already-declared domain
    pub fn add_instance(
        &mut self,
        serial: u32,
        internal: i32,
        external: impl Into<String>,
    ) -> Result<()> {
        let external = external.into();
        validate_name("instance name", &external)?;
        let domain = self
            .indoms
            .iter_mut()
            .find(|d| d.serial == serial)
            .ok_or_else(|| {
                ShmStatsError::validation(format!("unknown instance domain serial {}", serial))
            })?;
        if domain.instances.iter().any(|i| i.internal == internal) {
            return Err(ShmStatsError::validation(format!(
                "duplicate internal instance id {} in domain {}",
                internal, serial
            )));
        }
        if domain.instances.iter().any(|i| i.external == external) {
            return Err(ShmStatsError::validation(format!(
                "duplicate instance name '{}' in domain {}",
                external, serial
            )));
        }
        domain.instances.push(Instance { internal, external });
        Ok(())
    }

    /// Attach a label to the registry itself
    pub fn add_registry_label(&mut self, name: &str, value: &str) -> Result<()> {
        self.push_label(LabelTarget::Registry, name, value)
    }

    /// Attach a label to an instance domain
    pub fn add_indom_label(&mut self, serial: u32, name: &str, value: &str) -> Result<()> {
        self.push_label(LabelTarget::Indom { serial }, name, value)
    }

    /// Attach a label to a metric
    pub fn add_metric_label(&mut self, item: u32, name: &str, value: &str) -> Result<()> {
        self.push_label(LabelTarget::Metric { item }, name, value)
    }

    /// Attach a label to one instance of a domain
    pub fn add_instance_label(
        &mut self,
        serial: u32,
        internal: i32,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.push_label(LabelTarget::Instance { serial, internal }, name, value)
    }

    fn push_label(&mut self, target: LabelTarget, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ShmStatsError::validation("label name cannot be empty"));
        }
        // name + ':' + value must fit the fixed label payload
        if name.len() + 1 + value.len() > LABEL_MAX {
            return Err(ShmStatsError::validation(format!(
                "label '{}' payload exceeds {} bytes",
                name, LABEL_MAX
            )));
        }
        self.labels.push(LabelEntry {
            target,
            name: name.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    /// Registry identity string
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Cluster id namespacing this registry's metric ids
    pub fn cluster(&self) -> u32 {
        self.cluster
    }

    /// Behavior flags
    pub fn flags(&self) -> RegistryFlags {
        self.flags
    }

    /// Declared metrics, in declaration order
    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    /// Declared instance domains, in declaration order
    pub fn indoms(&self) -> &[InstanceDomain] {
        &self.indoms
    }

    /// Declared labels, in declaration order
    pub fn labels(&self) -> &[LabelEntry] {
        &self.labels
    }

    /// Find a domain by serial
    pub fn indom(&self, serial: u32) -> Option<&InstanceDomain> {
        self.indoms.iter().find(|d| d.serial == serial)
    }

    /// Find a metric by name
    pub fn metric(&self, name: &str) -> Option<&MetricDescriptor> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShmStatsError::validation(format!(
            "{} cannot be empty",
            what
        )));
    }
    // Reserve one byte for the NUL terminator in the fixed-width field
    if name.len() >= NAME_MAX {
        return Err(ShmStatsError::validation(format!(
            "{} '{}' exceeds {} bytes",
            what,
            name,
            NAME_MAX - 1
        )));
    }
    if name.as_bytes().contains(&0) {
        return Err(ShmStatsError::validation(format!(
            "{} contains a NUL byte",
            what
        )));
    }
    Ok(())
}
