//! Region serialization and writer lifecycle
//!
//! A registry moves through `UNSTARTED -> ACTIVE -> STOPPED`. `start`
//! consumes the builder and returns the owned [`MappedRegistry`] resource;
//! there is no hidden singleton, so one process can run several independent
//! registries and tests get deterministic teardown.

use std::collections::HashMap;
use std::mem::offset_of;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::catalog::Registry;
use crate::error::Result;
use crate::layout::constants::*;
use crate::layout::headers::*;
use crate::layout::planner::{plan, RegionLayout};
use crate::values::ValueHandle;

use super::generation::GenerationPair;
use super::mapping::RegionMapping;

impl Registry {
    /// Commit the catalog to a shared region at `path` and go ACTIVE
    ///
    /// Plans the layout, creates (replacing any previous region on the same
    /// path) and zero-fills the backing file, serializes every catalog
    /// section and publishes the header with an even, equal generation
    /// pair. Planning failures leave no file behind.
    pub fn start(self, path: impl AsRef<Path>) -> Result<MappedRegistry> {
        let layout = plan(&self)?;
        let mapping = RegionMapping::create(path.as_ref(), layout.total_size as usize)?;
        let base = unsafe { mapping.base_ptr() };

        serialize_catalog(base, &self, &layout);

        // Header goes last so a concurrent reader cannot validate the magic
        // before the catalog sections exist.
        let header = RegionHeader::new(std::process::id(), self.cluster(), self.flags().bits());
        unsafe {
            std::ptr::write(base as *mut RegionHeader, header);
        }
        mapping.flush()?;

        let generation = unsafe {
            GenerationPair::from_raw(
                base.add(offset_of!(RegionHeader, g1)) as *const u64,
                base.add(offset_of!(RegionHeader, g2)) as *const u64,
            )
        };

        debug!(
            path = %mapping.path().display(),
            size = layout.total_size,
            metrics = layout.metrics.count,
            values = layout.values.count,
            "metric region started"
        );

        Ok(MappedRegistry {
            registry: self,
            layout,
            mapping: Some(mapping),
            generation,
            write_lock: Mutex::new(()),
            handles: Mutex::new(HashMap::new()),
        })
    }
}

/// An ACTIVE registry mapped into a shared region
///
/// Exclusive owner of the region for mutation. Reader processes map the
/// same file read-only and rely on the generation pair for consistency.
#[derive(Debug)]
pub struct MappedRegistry {
    pub(crate) registry: Registry,
    pub(crate) layout: RegionLayout,
    pub(crate) mapping: Option<RegionMapping>,
    pub(crate) generation: GenerationPair,
    /// Serializes generation-bumped write sequences between threads of the
    /// writer process; the seqlock alone does not order concurrent writers
    pub(crate) write_lock: Mutex<()>,
    pub(crate) handles: Mutex<HashMap<(String, Option<String>), ValueHandle>>,
}

// The raw pointers in `generation` target the mapping owned by this value,
// and all mutation is funneled through atomics or `write_lock`.
unsafe impl Send for MappedRegistry {}
unsafe impl Sync for MappedRegistry {}

impl MappedRegistry {
    /// The committed catalog backing this region
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The planned byte layout of the region
    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// True until `stop` (or drop) tears the region down
    pub fn is_active(&self) -> bool {
        self.mapping.is_some()
    }

    /// Path of the backing file while active
    pub fn path(&self) -> Option<&Path> {
        self.mapping.as_ref().map(|m| m.path())
    }

    /// The whole region as bytes, for diagnostic or test inspection
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(|m| m.as_slice())
    }

    /// Transition ACTIVE -> STOPPED: unmap and remove the backing file
    ///
    /// Idempotent; stopping an already stopped registry is a no-op.
    /// Cleanup failures are logged, never propagated, so teardown cannot
    /// be blocked by one failed step.
    pub fn stop(&mut self) {
        let Some(mapping) = self.mapping.take() else {
            return;
        };
        if let Err(e) = mapping.flush() {
            debug!(error = %e, "flush on stop failed");
        }
        if let Err(e) = mapping.unlink() {
            warn!(
                path = %mapping.path().display(),
                error = %e,
                "failed to remove region backing file"
            );
        }
        self.handles.lock().unwrap().clear();
        // The mapping (and with it the mmap) drops here; the generation
        // pointers are never dereferenced again because every operation
        // checks `is_active` first.
    }

    /// Base pointer of the mapping, or InvalidState when stopped
    pub(crate) fn active_base(&self) -> Result<*mut u8> {
        match &self.mapping {
            Some(mapping) => Ok(unsafe { mapping.base_ptr() }),
            None => Err(crate::error::ShmStatsError::invalid_state(
                "registry is stopped",
            )),
        }
    }
}

impl Drop for MappedRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serialize every catalog section into the zeroed region
fn serialize_catalog(base: *mut u8, registry: &Registry, layout: &RegionLayout) {
    unsafe {
        for (i, section) in layout.toc().iter().enumerate() {
            write_block(
                base,
                (HEADER_SIZE + i * TOC_STRIDE) as u64,
                TocEntry::new(section.section, section.count, section.stride, section.offset),
            );
        }

        for (idx, domain) in registry.indoms().iter().enumerate() {
            let first_instance = layout
                .instance_plans
                .iter()
                .position(|p| p.indom_idx == idx)
                .map(|g| layout.instance_offset(g))
                .unwrap_or(0);
            let help = layout.indom_help[idx];
            write_block(
                base,
                layout.indom_offset(idx),
                IndomBlock {
                    serial: domain.serial,
                    count: domain.instances.len() as u32,
                    first_instance,
                    shorttext: write_help(base, layout, help.shorttext, &domain.shorttext),
                    helptext: write_help(base, layout, help.helptext, &domain.helptext),
                },
            );
        }

        for (gidx, iplan) in layout.instance_plans.iter().enumerate() {
            let instance = &registry.indoms()[iplan.indom_idx].instances[iplan.member_idx];
            write_block(
                base,
                layout.instance_offset(gidx),
                InstanceBlock::new(
                    layout.indom_offset(iplan.indom_idx),
                    instance.internal,
                    &instance.external,
                ),
            );
        }

        for (idx, metric) in registry.metrics().iter().enumerate() {
            let help = layout.metric_help[idx];
            let shorttext = write_help(base, layout, help.shorttext, &metric.shorttext);
            let helptext = write_help(base, layout, help.helptext, &metric.helptext);
            write_block(
                base,
                layout.metric_offset(idx),
                MetricBlock::new(
                    &metric.name,
                    metric.item,
                    metric.mtype as u32,
                    metric.semantics as u32,
                    metric.units.pack(),
                    metric.indom.map(|s| s as i32).unwrap_or(-1),
                    shorttext,
                    helptext,
                ),
            );
        }

        let sentinel = registry.flags().sentinel;
        for (vidx, vplan) in layout.value_plans.iter().enumerate() {
            let metric = &registry.metrics()[vplan.metric_idx];
            let payload = match vplan.string_idx {
                Some(string_idx) => layout.string_offset(string_idx),
                None if sentinel => SENTINEL_VALUE,
                None => 0,
            };
            write_block(
                base,
                layout.value_offset(vidx),
                ValueBlock {
                    payload,
                    extra: 0,
                    metric: layout.metric_offset(vplan.metric_idx),
                    instance: vplan.instance_idx.map(|g| layout.instance_offset(g)).unwrap_or(0),
                },
            );
            debug_assert!(metric.mtype.is_numeric() || vplan.string_idx.is_some());
        }

        for (idx, label) in registry.labels().iter().enumerate() {
            use crate::catalog::LabelTarget;
            let (identity, internal) = match label.target {
                LabelTarget::Registry => (0, -1),
                LabelTarget::Indom { serial } => (serial, -1),
                LabelTarget::Metric { item } => (item, -1),
                LabelTarget::Instance { serial, internal } => (serial, internal),
            };
            write_block(
                base,
                layout.label_offset(idx),
                LabelBlock::new(
                    label.target.flag_bits(),
                    identity,
                    internal,
                    &label.name,
                    &label.value,
                ),
            );
        }
    }
}

/// Write one help text into its assigned string slot, returning the slot
/// offset for the referencing descriptor (0 when absent)
unsafe fn write_help(
    base: *mut u8,
    layout: &RegionLayout,
    slot: Option<u32>,
    text: &Option<String>,
) -> u64 {
    match (slot, text) {
        (Some(idx), Some(text)) => {
            let offset = layout.string_offset(idx);
            write_string_slot(base, offset, text.as_bytes());
            offset
        }
        _ => 0,
    }
}

/// Copy bytes into a string slot, truncating and NUL-terminating
pub(crate) unsafe fn write_string_slot(base: *mut u8, offset: u64, bytes: &[u8]) {
    let len = bytes.len().min(STRING_MAX - 1);
    let dst = base.add(offset as usize);
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, len);
    // Zero the remainder so shrinking strings leave no tail bytes
    std::ptr::write_bytes(dst.add(len), 0, STRING_MAX - len);
}

unsafe fn write_block<T>(base: *mut u8, offset: u64, value: T) {
    std::ptr::write(base.add(offset as usize) as *mut T, value);
}
