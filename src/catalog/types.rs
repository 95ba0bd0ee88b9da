//! Catalog data types

use serde::{Deserialize, Serialize};

use crate::units::Units;

/// Scalar type of a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MetricType {
    /// 32-bit signed integer
    I32 = 0,
    /// 32-bit unsigned integer
    U32 = 1,
    /// 64-bit signed integer
    I64 = 2,
    /// 64-bit unsigned integer
    U64 = 3,
    /// 32-bit floating point
    Float = 4,
    /// 64-bit floating point
    Double = 5,
    /// NUL-terminated string
    String = 6,
    /// 64-bit elapsed time, accumulated in microseconds
    Elapsed = 7,
}

impl MetricType {
    /// Decode the wire representation
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::I32),
            1 => Some(Self::U32),
            2 => Some(Self::I64),
            3 => Some(Self::U64),
            4 => Some(Self::Float),
            5 => Some(Self::Double),
            6 => Some(Self::String),
            7 => Some(Self::Elapsed),
            _ => None,
        }
    }

    /// True for types whose value fits a single 8-byte numeric slot
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::String)
    }
}

/// Value semantics of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum Semantics {
    /// Monotonically non-decreasing
    Counter = 0,
    /// Point-in-time gauge
    Instant = 1,
    /// Gauge that holds until the next write
    Discrete = 2,
}

impl Semantics {
    /// Decode the wire representation
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Counter),
            1 => Some(Self::Instant),
            2 => Some(Self::Discrete),
            _ => None,
        }
    }
}

/// Registry behavior flags published in the region header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFlags {
    /// Don't prefix metric names with the registry identity
    pub no_prefix: bool,
    /// Readers should check the writer pid for liveness
    pub process_check: bool,
    /// Numeric slots start at the sentinel bit pattern ("no data yet")
    /// instead of zero
    pub sentinel: bool,
}

impl RegistryFlags {
    const NO_PREFIX: u32 = 0x1;
    const PROCESS_CHECK: u32 = 0x2;
    const SENTINEL: u32 = 0x4;

    /// Encode into the header flag word
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.no_prefix {
            bits |= Self::NO_PREFIX;
        }
        if self.process_check {
            bits |= Self::PROCESS_CHECK;
        }
        if self.sentinel {
            bits |= Self::SENTINEL;
        }
        bits
    }

    /// Decode from the header flag word; unknown bits are ignored
    pub fn from_bits(bits: u32) -> Self {
        Self {
            no_prefix: bits & Self::NO_PREFIX != 0,
            process_check: bits & Self::PROCESS_CHECK != 0,
            sentinel: bits & Self::SENTINEL != 0,
        }
    }
}

/// Declaration of a single metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Metric name, unique within the registry
    pub name: String,
    /// Stable numeric item id, unique within the registry
    pub item: u32,
    pub mtype: MetricType,
    pub semantics: Semantics,
    pub units: Units,
    /// Serial of the instance domain this metric is replicated over;
    /// `None` makes the metric a singleton with one value
    pub indom: Option<u32>,
    pub shorttext: Option<String>,
    pub helptext: Option<String>,
}

/// An ordered set of instances a metric can be replicated over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDomain {
    /// Unique serial number
    pub serial: u32,
    /// Instances in declaration order
    pub instances: Vec<Instance>,
    pub shorttext: Option<String>,
    pub helptext: Option<String>,
}

/// One member of an instance domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Internal id, stable and unique within the domain
    pub internal: i32,
    /// External name, unique within the domain
    pub external: String,
}

/// What a label annotates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelTarget {
    /// The whole registry
    Registry,
    /// An instance domain, by serial
    Indom { serial: u32 },
    /// A metric, by item id
    Metric { item: u32 },
    /// One instance within a domain
    Instance { serial: u32, internal: i32 },
}

impl LabelTarget {
    /// Wire discriminator stored in the label block flags field
    pub fn flag_bits(&self) -> u32 {
        match self {
            Self::Registry => 1,
            Self::Indom { .. } => 2,
            Self::Metric { .. } => 4,
            Self::Instance { .. } => 8,
        }
    }
}

/// A name/value annotation attached to a catalog element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEntry {
    pub target: LabelTarget,
    pub name: String,
    pub value: String,
}
