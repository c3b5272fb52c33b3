//! Error types for track resolution

use std::fmt;
use track_cache::CacheError;
use track_fetcher::FetchError;

#[derive(Debug)]
pub enum GateError {
    /// Transport failure or non-success response while fetching
    Network(FetchError),
    /// Eviction or writing the fetched payload failed
    PartialWrite(CacheError),
    /// Name validation failed before any fetch
    Cache(CacheError),
    /// The detached resolve task panicked or was cancelled
    Task(String),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::Network(err) => write!(f, "Network error: {}", err),
            GateError::PartialWrite(err) => write!(f, "Failed to store track: {}", err),
            GateError::Cache(err) => write!(f, "Cache error: {}", err),
            GateError::Task(msg) => write!(f, "Resolve task failed: {}", msg),
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GateError::Network(err) => Some(err),
            GateError::PartialWrite(err) | GateError::Cache(err) => Some(err),
            GateError::Task(_) => None,
        }
    }
}

impl From<FetchError> for GateError {
    fn from(err: FetchError) -> Self {
        GateError::Network(err)
    }
}

impl From<CacheError> for GateError {
    fn from(err: CacheError) -> Self {
        GateError::Cache(err)
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
