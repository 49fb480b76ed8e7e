//! Last.fm `track.getSimilar` client.
//!
//! No retries: throttling and service errors halt the run. Error 6
//! ("Track not found") means the track has no known neighbours.

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::LastFmConfig;
use crate::error::ApiError;
use crate::models::SimilarTrack;
use crate::services::SimilarityExpander;

const SERVICE: &str = "Last.fm";
const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = concat!("preview-datasets/", env!("CARGO_PKG_VERSION"));

const ERROR_TRACK_NOT_FOUND: i64 = 6;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GetSimilarResponse {
    Failure { error: i64, message: String },
    Success { similartracks: SimilarTracks },
}

#[derive(Debug, Deserialize)]
struct SimilarTracks {
    #[serde(default)]
    track: OneOrMany<LfmTrack>,
}

/// Last.fm collapses one-element lists to a bare object and empty lists to
/// whitespace strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
    Blank(String),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
            OneOrMany::Blank(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LfmTrack {
    name: String,
    #[serde(rename = "match", default)]
    score: Score,
    artist: LfmArtist,
}

#[derive(Debug, Deserialize)]
struct LfmArtist {
    name: String,
}

/// `match` is a number in current responses and a string in older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Score {
    Number(f64),
    Text(String),
}

impl Default for Score {
    fn default() -> Self {
        Score::Number(0.0)
    }
}

impl Score {
    fn value(&self) -> f64 {
        match self {
            Score::Number(n) => *n,
            Score::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LastFmClient {
    http: Client,
    config: LastFmConfig,
}

impl LastFmClient {
    pub fn new(config: LastFmConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::http(SERVICE))?;
        Ok(Self { http, config })
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }
}

impl SimilarityExpander for LastFmClient {
    fn similar(&self, artist: &str, track: &str, limit: usize) -> Result<Vec<SimilarTrack>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit_param = limit.to_string();
        let resp = self
            .http
            .get(API_ROOT)
            .query(&[
                ("method", "track.getsimilar"),
                ("artist", artist),
                ("track", track),
                ("limit", limit_param.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .map_err(ApiError::http(SERVICE))?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(ApiError::http(SERVICE))?;
        Ok(parse_similar(status, &body, limit)?)
    }
}

/// Decode a `track.getSimilar` body into at most `limit` tracks, best match first.
pub(crate) fn parse_similar(status: u16, body: &str, limit: usize) -> Result<Vec<SimilarTrack>, ApiError> {
    match serde_json::from_str::<GetSimilarResponse>(body) {
        Ok(GetSimilarResponse::Success { similartracks }) => {
            Ok(rank(similartracks.track.into_vec(), limit))
        }
        Ok(GetSimilarResponse::Failure { error, .. }) if error == ERROR_TRACK_NOT_FOUND => Ok(Vec::new()),
        Ok(GetSimilarResponse::Failure { error, message }) => Err(ApiError::Service {
            service: SERVICE,
            code: error,
            message,
        }),
        Err(_) => Err(ApiError::Status {
            service: SERVICE,
            status,
            body: body.chars().take(200).collect(),
        }),
    }
}

fn rank(tracks: Vec<LfmTrack>, limit: usize) -> Vec<SimilarTrack> {
    let mut similar: Vec<SimilarTrack> = tracks
        .into_iter()
        .map(|t| SimilarTrack {
            score: t.score.value(),
            artist: t.artist.name,
            track: t.name,
        })
        .collect();
    // Stable: equal scores keep the service's order.
    similar.sort_by(|a, b| b.score.total_cmp(&a.score));
    similar.truncate(limit);
    similar
}
