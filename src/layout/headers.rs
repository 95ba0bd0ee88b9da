//! Wire structures for the shared region
//!
//! Every struct here is `#[repr(C)]`, little-endian on all supported
//! targets, and free of internal pointers: cross-block references are
//! absolute byte offsets so the region can be mapped at different base
//! addresses by different processes.

use std::mem::size_of;

use crate::error::{Result, ShmStatsError};

use super::constants::*;

/// Fixed header at offset 0 of every region
#[repr(C)]
pub struct RegionHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Binary format version
    pub version: u32,
    /// Number of TOC entries following this header
    pub toc_count: u32,
    /// First generation counter; odd while a write is in progress
    pub g1: u64,
    /// Second generation counter; equals g1 when the snapshot is consistent
    pub g2: u64,
    /// Writer process id, meaningful when the process-check flag is set
    pub pid: u32,
    /// Cluster id namespacing metric ids
    pub cluster: u32,
    /// Registry behavior flags
    pub flags: u32,
    _reserved: u32,
}

impl RegionHeader {
    /// Build a header describing a freshly serialized, consistent region
    pub fn new(pid: u32, cluster: u32, flags: u32) -> Self {
        Self {
            magic: REGION_MAGIC,
            version: FORMAT_VERSION,
            toc_count: TOC_ENTRIES as u32,
            g1: 0,
            g2: 0,
            pid,
            cluster,
            flags,
            _reserved: 0,
        }
    }

    /// Validate magic and version of a mapped or copied region
    pub fn validate(&self) -> Result<()> {
        if self.magic != REGION_MAGIC {
            return Err(ShmStatsError::validation("bad region magic"));
        }
        if self.version != FORMAT_VERSION {
            return Err(ShmStatsError::validation(format!(
                "unsupported format version {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// One table-of-contents entry
///
/// Count and stride live here so each section is parseable without any
/// external schema or reliance on total file size.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TocEntry {
    pub section: u32,
    pub count: u32,
    pub stride: u32,
    _pad: u32,
    pub offset: u64,
}

impl TocEntry {
    pub fn new(section: u32, count: u32, stride: u32, offset: u64) -> Self {
        Self {
            section,
            count,
            stride,
            _pad: 0,
            offset,
        }
    }
}

/// Instance domain descriptor
#[repr(C)]
pub struct IndomBlock {
    pub serial: u32,
    /// Number of instances in this domain
    pub count: u32,
    /// Offset of the domain's first InstanceBlock; instances are contiguous
    pub first_instance: u64,
    /// String section offset of the short help text, 0 = none
    pub shorttext: u64,
    /// String section offset of the long help text, 0 = none
    pub helptext: u64,
}

/// Instance descriptor
#[repr(C)]
pub struct InstanceBlock {
    /// Offset of the owning IndomBlock
    pub indom: u64,
    /// Internal instance id
    pub internal: i32,
    _pad: u32,
    /// External name, NUL-terminated
    pub external: [u8; NAME_MAX],
}

impl InstanceBlock {
    pub fn new(indom: u64, internal: i32, external: &str) -> Self {
        Self {
            indom,
            internal,
            _pad: 0,
            external: pack_name(external),
        }
    }
}

/// Metric descriptor
#[repr(C)]
pub struct MetricBlock {
    /// Metric name, NUL-terminated
    pub name: [u8; NAME_MAX],
    /// Stable item id
    pub item: u32,
    /// MetricType wire value
    pub mtype: u32,
    /// Semantics wire value
    pub sem: u32,
    /// Packed Units encoding
    pub unit: u32,
    /// Instance domain serial, -1 for singleton metrics
    pub indom: i32,
    _pad: u32,
    /// String section offset of the short help text, 0 = none
    pub shorttext: u64,
    /// String section offset of the long help text, 0 = none
    pub helptext: u64,
}

impl MetricBlock {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        item: u32,
        mtype: u32,
        sem: u32,
        unit: u32,
        indom: i32,
        shorttext: u64,
        helptext: u64,
    ) -> Self {
        Self {
            name: pack_name(name),
            item,
            mtype,
            sem,
            unit,
            indom,
            _pad: 0,
            shorttext,
            helptext,
        }
    }
}

/// Mutable value slot for one (metric, instance) pair
///
/// `payload` holds the numeric value bits, or the string-section offset for
/// string metrics. `extra` is scratch: elapsed-time start timestamp for
/// Elapsed metrics, current string length for string metrics.
#[repr(C)]
pub struct ValueBlock {
    pub payload: u64,
    pub extra: u64,
    /// Offset of the owning MetricBlock
    pub metric: u64,
    /// Offset of the InstanceBlock, 0 for singleton metrics
    pub instance: u64,
}

/// Fixed-size string payload slot, always NUL-terminated
#[repr(C)]
pub struct StringBlock {
    pub payload: [u8; STRING_MAX],
}

/// Label annotation block
#[repr(C)]
pub struct LabelBlock {
    /// Target discriminator bits
    pub flags: u32,
    /// Indom serial or metric item id, per target
    pub identity: u32,
    /// Instance internal id, -1 when not instance-scoped
    pub internal: i32,
    /// Length of the label name within the payload
    pub name_len: u32,
    /// Length of the label value within the payload
    pub value_len: u32,
    _pad: u32,
    /// "name:value" bytes
    pub payload: [u8; LABEL_MAX],
}

impl LabelBlock {
    pub fn new(flags: u32, identity: u32, internal: i32, name: &str, value: &str) -> Self {
        let mut payload = [0u8; LABEL_MAX];
        let name_len = name.len().min(LABEL_MAX);
        payload[..name_len].copy_from_slice(&name.as_bytes()[..name_len]);
        let mut value_len = 0;
        if name_len < LABEL_MAX {
            payload[name_len] = b':';
            value_len = value.len().min(LABEL_MAX - name_len - 1);
            payload[name_len + 1..name_len + 1 + value_len]
                .copy_from_slice(&value.as_bytes()[..value_len]);
        }
        Self {
            flags,
            identity,
            internal,
            name_len: name_len as u32,
            value_len: value_len as u32,
            _pad: 0,
            payload,
        }
    }
}

/// Copy a name into a fixed NUL-terminated field
///
/// Callers validate length up front; truncation here is a last resort.
pub fn pack_name(name: &str) -> [u8; NAME_MAX] {
    let mut field = [0u8; NAME_MAX];
    let len = name.len().min(NAME_MAX - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// Read a NUL-terminated fixed field back into a string
pub fn unpack_name(field: &[u8]) -> String {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// Wire strides, fixed per format version
pub const HEADER_SIZE: usize = size_of::<RegionHeader>();
pub const TOC_STRIDE: usize = size_of::<TocEntry>();
pub const INDOM_STRIDE: usize = size_of::<IndomBlock>();
pub const INSTANCE_STRIDE: usize = size_of::<InstanceBlock>();
pub const METRIC_STRIDE: usize = size_of::<MetricBlock>();
pub const VALUE_STRIDE: usize = size_of::<ValueBlock>();
pub const STRING_STRIDE: usize = size_of::<StringBlock>();
pub const LABEL_STRIDE: usize = size_of::<LabelBlock>();
