//! Track Fetcher
//!
//! The network side of the track cache: a `Fetch` trait that turns a URL into
//! a complete byte payload, and a reqwest-backed implementation of it.

pub mod error;
pub mod fetcher;

pub use error::{FetchError, Result};
pub use fetcher::{Fetch, HttpFetcher};
