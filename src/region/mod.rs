//! Shared region lifecycle, seqlock protocol and read-side parsing

pub mod generation;
pub mod mapping;
pub mod snapshot;
pub mod writer;

pub use generation::GenerationPair;
pub use mapping::RegionMapping;
pub use snapshot::{RegionSnapshot, SnapshotIndom, SnapshotLabel, SnapshotMetric, SnapshotValue};
pub use writer::MappedRegistry;

/// Default reader retry budget before giving up with a staleness error
pub const DEFAULT_READ_RETRIES: usize = 64;
