//! Versioned track list snapshots
//!
//! Each refresh of the remote list produces a new immutable snapshot with a
//! higher revision. Readers hold an `Arc` to the snapshot they started with
//! and compare revisions to notice that a newer list exists.

use crate::types::Track;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// One published version of the track list
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub revision: u64,
    pub tracks: Vec<Track>,
    pub published_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    fn empty() -> Self {
        Self {
            revision: 0,
            tracks: Vec::new(),
            published_at: Utc::now(),
        }
    }

    /// Look up a track by its display name
    pub fn find(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Owner of the current track list
pub struct TrackCatalog {
    tx: watch::Sender<Arc<CatalogSnapshot>>,
}

impl TrackCatalog {
    /// Create a catalog holding an empty revision-0 snapshot
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(CatalogSnapshot::empty()));
        Self { tx }
    }

    /// Replace the track list, returning the new revision
    pub fn publish(&self, tracks: Vec<Track>) -> u64 {
        let tracks: Vec<Track> = tracks.into_iter().map(Track::normalized).collect();
        let count = tracks.len();

        let mut revision = 0;
        self.tx.send_modify(|current| {
            revision = current.revision + 1;
            *current = Arc::new(CatalogSnapshot {
                revision,
                tracks,
                published_at: Utc::now(),
            });
        });

        info!(revision, tracks = count, "Published track catalog");
        revision
    }

    /// The latest snapshot
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    /// Receive every future snapshot as it is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.tx.subscribe()
    }
}

impl Default for TrackCatalog {
    fn default() -> Self {
        Self::new()
    }
}
