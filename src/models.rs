//! Core data models for the preview dataset pipeline.
//!
//! Catalog rows, the records written to the two datasets, and the
//! resolver outcome shared by the search-service clients.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Catalog Models
// ============================================================================

/// One (artist, track) pair from the deduplicated catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CatalogEntry {
    pub artist: String,
    pub track: String,
}

impl CatalogEntry {
    pub fn new(artist: impl Into<String>, track: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            track: track.into(),
        }
    }

    /// Uniqueness key: `artist + "_" + track`, exact and case-sensitive.
    pub fn key(&self) -> String {
        catalog_key(&self.artist, &self.track)
    }
}

pub fn catalog_key(artist: &str, track: &str) -> String {
    format!("{}_{}", artist, track)
}

/// Row layout of the cached unique catalog (`Artist,Track,artist_track`).
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedCatalogRow {
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Track")]
    pub track: String,
    pub artist_track: String,
}

impl From<&CatalogEntry> for CachedCatalogRow {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            artist: entry.artist.clone(),
            track: entry.track.clone(),
            artist_track: entry.key(),
        }
    }
}

impl From<CachedCatalogRow> for CatalogEntry {
    fn from(row: CachedCatalogRow) -> Self {
        Self {
            artist: row.artist,
            track: row.track,
        }
    }
}

// ============================================================================
// Dataset Models
// ============================================================================

/// Result of resolving and fetching a preview for one catalog entry.
/// `preview_url` is `None` when the track could not be resolved or has no preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewRecord {
    pub artist: String,
    pub track: String,
    pub preview_url: Option<String>,
}

/// Dataset 1 row: `artist,track,url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryRow {
    pub artist: String,
    pub track: String,
    pub url: String,
}

impl PrimaryRow {
    pub fn from_record(record: PreviewRecord) -> Option<Self> {
        let url = record.preview_url?;
        Some(Self {
            artist: record.artist,
            track: record.track,
            url,
        })
    }

    pub fn key(&self) -> String {
        catalog_key(&self.artist, &self.track)
    }
}

/// Dataset 2 row: the primary URL followed by up to N-1 similar-track URLs
/// in the recommendation service's ranking order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimilarityRecord {
    pub primary_url: String,
    pub similar_urls: Vec<String>,
}

impl SimilarityRecord {
    pub fn new(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            similar_urls: Vec::new(),
        }
    }

    /// Flattened CSV fields, primary URL first.
    pub fn fields(&self) -> Vec<&str> {
        std::iter::once(self.primary_url.as_str())
            .chain(self.similar_urls.iter().map(String::as_str))
            .collect()
    }
}

// ============================================================================
// Service Models
// ============================================================================

/// Canonical track identifier in the music-search service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a search lookup. Service failures are errors, not `Unresolved`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(TrackId),
    Unresolved,
}

/// A neighbour returned by the recommendation service.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarTrack {
    pub artist: String,
    pub track: String,
    /// Service similarity score (higher is closer).
    pub score: f64,
}
