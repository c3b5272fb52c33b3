//! Core types for the track cache proxy

use serde::Serialize;
use std::path::PathBuf;
use track_cache::{CacheStats, DEFAULT_CAPACITY, DEFAULT_EXTENSION};
use track_gate::GateStats;

/// Configuration for the track cache proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub max_cache_count: usize,
    pub cache_extension: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cache_dir: PathBuf::from("./cache/tracks"),
            max_cache_count: DEFAULT_CAPACITY,
            cache_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub gate: GateStats,
    pub catalog_revision: u64,
}

/// Names currently held in the cache
#[derive(Debug, Serialize)]
pub struct CacheListResponse {
    pub entries: Vec<String>,
}

/// Result of publishing a new track list
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub revision: u64,
    pub tracks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 3002);
        assert_eq!(config.cache_dir, PathBuf::from("./cache/tracks"));
        assert_eq!(config.max_cache_count, 5);
        assert_eq!(config.cache_extension, ".mp3");
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            cache: CacheStats {
                entries: 4,
                total_size: 18_000_000,
                capacity: 5,
            },
            gate: GateStats {
                hits: 500,
                misses: 50,
                coalesced: 3,
                failures: 1,
            },
            catalog_revision: 7,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"uptime_secs\":3600"));
        assert!(json.contains("\"hits\":500"));
        assert!(json.contains("\"catalog_revision\":7"));
    }
}
