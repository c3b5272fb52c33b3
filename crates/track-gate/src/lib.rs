//! Track Gate
//!
//! Resolves "play this track" to a local file. Cached tracks are served
//! straight from the store; anything else is fetched, written through the
//! bounded cache and then handed back. Also holds the versioned track catalog
//! that callers resolve names against.

pub mod catalog;
pub mod error;
pub mod gate;
pub mod types;

pub use catalog::{CatalogSnapshot, TrackCatalog};
pub use error::{GateError, Result};
pub use gate::FetchGate;
pub use types::{GateStats, Resolved, Source, Track};
