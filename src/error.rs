//! Error types and handling for shmstats

/// Result type alias for shmstats operations
pub type Result<T> = std::result::Result<T, ShmStatsError>;

/// Error types for the shared-memory metric registry
#[derive(Debug, thiserror::Error)]
pub enum ShmStatsError {
    /// Catalog or layout validation failures (duplicate names/ids, bad
    /// units, undefined instance domain references). Raised at build or
    /// plan time, never after a region is active.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Backing storage could not be created, sized, mapped or removed
    #[error("Resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Lookup or update referenced an unknown metric or instance name
    #[error("Not found: {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// Operation inconsistent with the metric's declared type
    #[error("Type mismatch on metric '{metric}': {message}")]
    TypeMismatch { metric: String, message: String },

    /// Operation used out of order (e.g. interval end without a start)
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Reader retry budget exhausted while the writer kept the region busy
    #[error("Stale region: no consistent snapshot after {retries} retries")]
    Staleness { retries: usize },
}

impl ShmStatsError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a resource error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Resource {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a resource error without an I/O source
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            source: None,
        }
    }

    /// Create a metric-not-found error
    pub fn metric_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "metric",
            name: name.into(),
        }
    }

    /// Create an instance-not-found error
    pub fn instance_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "instance",
            name: name.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            metric: metric.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// True for errors a reader should treat as "region absent", which is a
    /// normal state distinguishable from "not yet started"
    pub fn is_region_absent(&self) -> bool {
        matches!(
            self,
            Self::Resource {
                source: Some(io),
                ..
            } if io.kind() == std::io::ErrorKind::NotFound
        )
    }
}
