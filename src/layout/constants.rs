//! Constants for the shared region binary format

/// Magic tag identifying a shmstats region ("SHMSTAT1")
pub const REGION_MAGIC: u64 = 0x5348_4D53_5441_5431;

/// Current binary format version
pub const FORMAT_VERSION: u32 = 1;

/// Fixed capacity of name fields, including the NUL terminator
pub const NAME_MAX: usize = 64;

/// Fixed capacity of one string payload slot, including the NUL terminator
pub const STRING_MAX: usize = 256;

/// Fixed capacity of one label payload ("name:value" bytes)
pub const LABEL_MAX: usize = 232;

/// Number of table-of-contents entries in every region
pub const TOC_ENTRIES: usize = 6;

/// Section identifiers stored in TOC entries
pub mod section {
    pub const INDOMS: u32 = 1;
    pub const INSTANCES: u32 = 2;
    pub const METRICS: u32 = 3;
    pub const VALUES: u32 = 4;
    pub const STRINGS: u32 = 5;
    pub const LABELS: u32 = 6;
}

/// Reserved numeric bit pattern meaning "no data available", used when the
/// sentinel registry flag is set
pub const SENTINEL_VALUE: u64 = u64::MAX;
