//! Seams between the pipeline and the external services.
//!
//! The Spotify client implements [`TrackResolver`] and [`PreviewFetcher`],
//! the Last.fm client implements [`SimilarityExpander`]. Tests drive the
//! pipeline through in-memory implementations.

use anyhow::Result;

use crate::models::{Resolution, SimilarTrack, TrackId};

pub trait TrackResolver {
    /// Best textual match for `track` by `artist`, restricted to tracks.
    fn resolve(&self, artist: &str, track: &str) -> Result<Resolution>;
}

pub trait PreviewFetcher {
    /// Preview clip URL for a resolved track, `None` if the service has none.
    fn preview_url(&self, id: &TrackId) -> Result<Option<String>>;
}

pub trait SimilarityExpander {
    /// Up to `limit` neighbours of the given track, best match first.
    /// An empty list means the track has no known neighbours.
    fn similar(&self, artist: &str, track: &str, limit: usize) -> Result<Vec<SimilarTrack>>;
}
