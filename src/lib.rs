//! # shmstats - Shared-Memory Metric Registry
//!
//! shmstats lets an instrumented process publish named, typed performance
//! metrics into a memory-mapped region that unrelated reader processes can
//! sample concurrently without locks, signals or IPC calls.
//!
//! ## Features
//!
//! - **Self-describing binary format**: header, table of contents and
//!   fixed-stride catalog sections, parseable from the raw bytes alone
//! - **Seqlock consistency**: a generation pair lets readers detect and
//!   retry torn reads while the writer never blocks
//! - **Stable value handles**: name lookups are memoized into direct slot
//!   references for hot-path updates
//! - **Instance domains**: metrics replicated over ordered instance sets
//!   (per-CPU, per-disk, ...) with per-instance values
//! - **Legacy front end**: whole catalogs supplied as static arrays feed
//!   the same planner and writer as the incremental builder
//!
//! ## Architecture
//!
//! ```text
//! application code
//!       │ declare
//!       ▼
//! ┌────────────┐   plan    ┌───────────────┐   serialize   ┌──────────────┐
//! │  Registry  │──────────▶│ RegionLayout  │──────────────▶│ mapped region │
//! │  (catalog) │           │  (planner)    │               │  (seqlock)    │
//! └────────────┘           └───────────────┘               └──────┬───────┘
//!       │ lookup/update                                           │ mmap
//!       ▼                                                         ▼
//!  ValueHandle ──▶ increment / set / set_string            reader processes
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shmstats::{Registry, RegistryFlags, MetricType, Semantics, Units};
//!
//! let mut registry = Registry::new("myapp", 42, RegistryFlags::default());
//! registry.add_metric(
//!     "requests",
//!     1,
//!     MetricType::U64,
//!     Semantics::Counter,
//!     Units::count(),
//!     None,
//!     Some("total requests served"),
//!     None,
//! )?;
//!
//! let mapped = registry.start("/tmp/myapp.shmstats")?;
//! let handle = mapped.lookup("requests", None)?;
//! mapped.increment(&handle, 1.0)?;
//! # Ok::<(), shmstats::ShmStatsError>(())
//! ```

pub mod catalog;
pub mod compat;
pub mod error;
pub mod layout;
pub mod region;
pub mod units;
pub mod values;

pub use catalog::{
    Instance, InstanceDomain, LabelEntry, LabelTarget, MetricDescriptor, MetricType, Registry,
    RegistryFlags, Semantics,
};
pub use compat::{IndomSpec, InstanceSpec, MetricSpec};
pub use error::{Result, ShmStatsError};
pub use layout::planner::{plan, RegionLayout};
pub use region::{MappedRegistry, RegionSnapshot, DEFAULT_READ_RETRIES};
pub use units::Units;
pub use values::{TimerHandle, ValueHandle};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
