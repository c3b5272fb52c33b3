//! Track and resolution types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

const UNKNOWN_ARTIST: &str = "Unknown artist";

fn default_artist() -> String {
    UNKNOWN_ARTIST.to_string()
}

/// One entry of the remote track list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(alias = "musicName", default)]
    pub name: String,
    pub download_url: String,
    #[serde(default = "default_artist")]
    pub artist: String,
    #[serde(default)]
    pub lyric_url: Option<String>,
}

impl Track {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            artist: default_artist(),
            lyric_url: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    /// Fill in a blank name from the download URL
    ///
    /// Uses the parent path segment when there is one, otherwise the file
    /// name without its extension.
    pub fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            if let Some(name) = name_from_url(&self.download_url) {
                self.name = name;
            }
        }
        self
    }

    /// File name this track is cached under
    ///
    /// Path separators are replaced and `extension` is appended unless the
    /// name already carries it.
    pub fn cache_key(&self, extension: &str) -> String {
        let base: String = self
            .name
            .trim()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        let base = base.trim_start_matches('.');

        if base.ends_with(extension) && base.len() > extension.len() {
            base.to_string()
        } else {
            format!("{}{}", base, extension)
        }
    }
}

fn name_from_url(download_url: &str) -> Option<String> {
    let url = Url::parse(download_url).ok()?;
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();

    match segments.as_slice() {
        [] => None,
        [file] => {
            let stem = file.rsplit_once('.').map_or(file.as_str(), |(stem, _)| stem);
            (!stem.is_empty()).then(|| stem.to_string())
        }
        [.., parent, _] => Some(parent.clone()),
    }
}

/// Where a resolved track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
}

/// A track resolved to a local, playable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub location: PathBuf,
    pub source: Source,
}

impl Resolved {
    pub fn is_hit(&self) -> bool {
        self.source == Source::Cache
    }
}

/// Counters for the resolution paths taken so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub hits: u64,
    pub misses: u64,
    /// Requests that waited on an in-flight fetch and then hit the cache
    pub coalesced: u64,
    pub failures: u64,
}
