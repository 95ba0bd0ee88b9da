//! Raw read-side parsing of a shared region
//!
//! Rebuilds the whole catalog and current values from the region bytes
//! alone, with no external schema, under the generation-checked consistent
//! copy discipline. This is the reference decoder for reading agents and
//! the round-trip oracle for the writer's tests.

use std::mem::{offset_of, size_of};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::{MetricType, RegistryFlags, Semantics};
use crate::error::{Result, ShmStatsError};
use crate::layout::constants::*;
use crate::layout::headers::*;
use crate::units::Units;

use super::DEFAULT_READ_RETRIES;

/// One decoded instance domain
#[derive(Debug, Clone)]
pub struct SnapshotIndom {
    pub serial: u32,
    /// (internal id, external name) in region order
    pub instances: Vec<(i32, String)>,
    pub shorttext: Option<String>,
    pub helptext: Option<String>,
}

/// One decoded value slot
#[derive(Debug, Clone)]
pub struct SnapshotValue {
    /// External instance name, None for singleton metrics
    pub instance: Option<String>,
    /// Raw numeric payload bits (string metrics: the string offset)
    pub payload: u64,
    /// Scratch field (elapsed start timestamp or string length)
    pub extra: u64,
    /// Decoded string payload for string metrics
    pub string: Option<String>,
}

impl SnapshotValue {
    /// Payload as an unsigned integer
    pub fn as_u64(&self) -> u64 {
        self.payload
    }

    /// Payload as a signed integer
    pub fn as_i64(&self) -> i64 {
        self.payload as i64
    }

    /// Payload reinterpreted per the metric type
    pub fn as_f64(&self, mtype: MetricType) -> f64 {
        match mtype {
            MetricType::Float => f32::from_bits(self.payload as u32) as f64,
            MetricType::Double => f64::from_bits(self.payload),
            MetricType::I32 | MetricType::I64 => self.payload as i64 as f64,
            _ => self.payload as f64,
        }
    }
}

/// One decoded metric with its values
#[derive(Debug, Clone)]
pub struct SnapshotMetric {
    pub name: String,
    pub item: u32,
    pub mtype: MetricType,
    pub semantics: Semantics,
    pub units: Units,
    pub indom: Option<u32>,
    pub shorttext: Option<String>,
    pub helptext: Option<String>,
    pub values: Vec<SnapshotValue>,
}

impl SnapshotMetric {
    /// The single value of a singleton metric
    pub fn singleton(&self) -> Option<&SnapshotValue> {
        match self.indom {
            None => self.values.first(),
            Some(_) => None,
        }
    }

    /// The value for one instance of an instanced metric
    pub fn value_for(&self, instance: &str) -> Option<&SnapshotValue> {
        self.values
            .iter()
            .find(|v| v.instance.as_deref() == Some(instance))
    }
}

/// One decoded label
#[derive(Debug, Clone)]
pub struct SnapshotLabel {
    pub flags: u32,
    pub identity: u32,
    pub internal: i32,
    pub name: String,
    pub value: String,
}

/// A complete, consistent decode of one region
#[derive(Debug, Clone)]
pub struct RegionSnapshot {
    pub version: u32,
    pub pid: u32,
    pub cluster: u32,
    pub flags: RegistryFlags,
    pub indoms: Vec<SnapshotIndom>,
    pub metrics: Vec<SnapshotMetric>,
    pub labels: Vec<SnapshotLabel>,
}

impl RegionSnapshot {
    /// Map the region at `path` read-only and decode a consistent copy
    ///
    /// A missing file surfaces as a `Resource` error whose
    /// [`is_region_absent`](ShmStatsError::is_region_absent) is true;
    /// readers treat that as the normal "writer stopped or not yet
    /// started" state.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_with_retries(path, DEFAULT_READ_RETRIES)
    }

    /// As [`RegionSnapshot::read`] with an explicit retry budget
    pub fn read_with_retries(path: impl AsRef<Path>, max_retries: usize) -> Result<Self> {
        let mmap = super::mapping::RegionMapping::open_readonly(path.as_ref())?;
        let copy = consistent_copy(&mmap, max_retries)?;
        Self::parse(&copy)
    }

    /// Decode region bytes already known to be a consistent copy
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header: RegionHeader = read_block(bytes, 0)?;
        header.validate()?;
        if header.toc_count as usize != TOC_ENTRIES {
            return Err(ShmStatsError::validation(format!(
                "unexpected TOC entry count {}",
                header.toc_count
            )));
        }

        let mut sections = [None::<TocEntry>; TOC_ENTRIES];
        for i in 0..TOC_ENTRIES {
            let entry: TocEntry = read_block(bytes, (HEADER_SIZE + i * TOC_STRIDE) as u64)?;
            let slot = (entry.section as usize)
                .checked_sub(1)
                .filter(|s| *s < TOC_ENTRIES)
                .ok_or_else(|| {
                    ShmStatsError::validation(format!("unknown section id {}", entry.section))
                })?;
            sections[slot] = Some(entry);
        }
        let section_of = |id: u32| -> Result<TocEntry> {
            sections[(id - 1) as usize]
                .ok_or_else(|| ShmStatsError::validation(format!("missing section {}", id)))
        };

        let indom_toc = section_of(section::INDOMS)?;
        let instance_toc = section_of(section::INSTANCES)?;
        let metric_toc = section_of(section::METRICS)?;
        let value_toc = section_of(section::VALUES)?;
        let label_toc = section_of(section::LABELS)?;

        // Instance domains, remembering block offsets so instances and
        // values can be attached by reference.
        let mut indoms = Vec::with_capacity(indom_toc.count as usize);
        let mut indom_offsets = Vec::with_capacity(indom_toc.count as usize);
        for i in 0..indom_toc.count as u64 {
            let offset = indom_toc.offset + i * indom_toc.stride as u64;
            let block: IndomBlock = read_block(bytes, offset)?;
            indom_offsets.push(offset);
            indoms.push(SnapshotIndom {
                serial: block.serial,
                instances: Vec::new(),
                shorttext: read_string_ref(bytes, block.shorttext)?,
                helptext: read_string_ref(bytes, block.helptext)?,
            });
        }

        // Instances, grouped into their domains; also keep a by-offset
        // name index for value attribution.
        let mut instance_names = Vec::with_capacity(instance_toc.count as usize);
        for i in 0..instance_toc.count as u64 {
            let offset = instance_toc.offset + i * instance_toc.stride as u64;
            let block: InstanceBlock = read_block(bytes, offset)?;
            let external = unpack_name(&block.external);
            instance_names.push((offset, external.clone()));
            let domain_idx = indom_offsets
                .iter()
                .position(|&o| o == block.indom)
                .ok_or_else(|| {
                    ShmStatsError::validation("instance references unknown domain block")
                })?;
            indoms[domain_idx]
                .instances
                .push((block.internal, external));
        }

        let mut metrics = Vec::with_capacity(metric_toc.count as usize);
        let mut metric_offsets = Vec::with_capacity(metric_toc.count as usize);
        for i in 0..metric_toc.count as u64 {
            let offset = metric_toc.offset + i * metric_toc.stride as u64;
            let block: MetricBlock = read_block(bytes, offset)?;
            metric_offsets.push(offset);
            metrics.push(SnapshotMetric {
                name: unpack_name(&block.name),
                item: block.item,
                mtype: MetricType::from_wire(block.mtype).ok_or_else(|| {
                    ShmStatsError::validation(format!("unknown metric type {}", block.mtype))
                })?,
                semantics: Semantics::from_wire(block.sem).ok_or_else(|| {
                    ShmStatsError::validation(format!("unknown semantics {}", block.sem))
                })?,
                units: Units::unpack(block.unit),
                indom: (block.indom >= 0).then(|| block.indom as u32),
                shorttext: read_string_ref(bytes, block.shorttext)?,
                helptext: read_string_ref(bytes, block.helptext)?,
                values: Vec::new(),
            });
        }

        for i in 0..value_toc.count as u64 {
            let offset = value_toc.offset + i * value_toc.stride as u64;
            let block: ValueBlock = read_block(bytes, offset)?;
            let metric_idx = metric_offsets
                .iter()
                .position(|&o| o == block.metric)
                .ok_or_else(|| {
                    ShmStatsError::validation("value references unknown metric block")
                })?;
            let instance = if block.instance == 0 {
                None
            } else {
                Some(
                    instance_names
                        .iter()
                        .find(|(o, _)| *o == block.instance)
                        .map(|(_, name)| name.clone())
                        .ok_or_else(|| {
                            ShmStatsError::validation("value references unknown instance block")
                        })?,
                )
            };
            let string = if metrics[metric_idx].mtype == MetricType::String {
                read_string_ref(bytes, block.payload)?
            } else {
                None
            };
            metrics[metric_idx].values.push(SnapshotValue {
                instance,
                payload: block.payload,
                extra: block.extra,
                string,
            });
        }

        let mut labels = Vec::with_capacity(label_toc.count as usize);
        for i in 0..label_toc.count as u64 {
            let offset = label_toc.offset + i * label_toc.stride as u64;
            let block: LabelBlock = read_block(bytes, offset)?;
            let name_len = (block.name_len as usize).min(LABEL_MAX);
            let value_start = (name_len + 1).min(LABEL_MAX);
            let value_end = (value_start + block.value_len as usize).min(LABEL_MAX);
            labels.push(SnapshotLabel {
                flags: block.flags,
                identity: block.identity,
                internal: block.internal,
                name: String::from_utf8_lossy(&block.payload[..name_len]).into_owned(),
                value: String::from_utf8_lossy(&block.payload[value_start..value_end])
                    .into_owned(),
            });
        }

        Ok(Self {
            version: header.version,
            pid: header.pid,
            cluster: header.cluster,
            flags: RegistryFlags::from_bits(header.flags),
            indoms,
            metrics,
            labels,
        })
    }

    /// Find a decoded metric by name
    pub fn metric(&self, name: &str) -> Option<&SnapshotMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Copy the mapped bytes under the generation check
fn consistent_copy(mmap: &memmap2::Mmap, max_retries: usize) -> Result<Vec<u8>> {
    if mmap.len() < HEADER_SIZE {
        return Err(ShmStatsError::validation("region shorter than its header"));
    }
    let g1 = unsafe { &*(mmap.as_ptr().add(offset_of!(RegionHeader, g1)) as *const AtomicU64) };
    let g2 = unsafe { &*(mmap.as_ptr().add(offset_of!(RegionHeader, g2)) as *const AtomicU64) };

    for _ in 0..max_retries {
        let before = (g1.load(Ordering::Acquire), g2.load(Ordering::Acquire));
        if before.0 != before.1 || before.0 % 2 != 0 {
            std::hint::spin_loop();
            continue;
        }
        let copy = mmap.to_vec();
        let after = (g1.load(Ordering::Acquire), g2.load(Ordering::Acquire));
        if after == before {
            return Ok(copy);
        }
    }
    Err(ShmStatsError::Staleness {
        retries: max_retries,
    })
}

/// Bounds-checked unaligned read of one wire block
fn read_block<T>(bytes: &[u8], offset: u64) -> Result<T> {
    let offset = offset as usize;
    let end = offset
        .checked_add(size_of::<T>())
        .ok_or_else(|| ShmStatsError::validation("block offset overflow"))?;
    if end > bytes.len() {
        return Err(ShmStatsError::validation(format!(
            "block at {} extends past region end",
            offset
        )));
    }
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr().add(offset) as *const T) })
}

/// Decode a string slot referenced by offset; 0 means absent
fn read_string_ref(bytes: &[u8], offset: u64) -> Result<Option<String>> {
    if offset == 0 {
        return Ok(None);
    }
    let block: StringBlock = read_block(bytes, offset)?;
    Ok(Some(unpack_name_long(&block.payload)))
}

fn unpack_name_long(payload: &[u8]) -> String {
    let len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..len]).into_owned()
}
