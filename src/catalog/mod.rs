//! In-memory catalog construction for the shared metric region
//!
//! The catalog is built entirely in process-local memory before any shared
//! region exists. Once a registry is started, the catalog committed to the
//! region is immutable for that region's lifetime.

pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{
    Instance, InstanceDomain, LabelEntry, LabelTarget, MetricDescriptor, MetricType,
    RegistryFlags, Semantics,
};
