//! Bounded file-based track cache
//!
//! Stores downloaded tracks as flat files in one directory. The number of
//! valid entries is capped, and the least recently modified files are evicted
//! before a new key is written.

mod error;
mod store;
mod types;

pub use error::{CacheError, Result};
pub use store::{CacheStore, DEFAULT_CAPACITY, DEFAULT_EXTENSION};
pub use types::{CacheEntry, CacheStats};
