//! Spotify Web API client: track search and preview URLs.
//!
//! Uses the client-credentials grant. Throttled (429) and 5xx responses are
//! retried up to `SpotifyConfig::max_retries` times, honouring `Retry-After`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SpotifyConfig;
use crate::error::ApiError;
use crate::models::{Resolution, TrackId};
use crate::services::{PreviewFetcher, TrackResolver};

const SERVICE: &str = "Spotify";
const USER_AGENT: &str = concat!("preview-datasets/", env!("CARGO_PKG_VERSION"));

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Refresh the token this long before Spotify says it expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// `"audioPreview":{"url":"https://p.scdn.co/mp3-preview/..."}` in the embed page state.
static EMBED_PREVIEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""audioPreview"\s*:\s*\{\s*"url"\s*:\s*"([^"]+)""#).expect("embed preview pattern")
});

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    // null for local files
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    preview_url: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Service roots. Tests point these at a local mock server.
#[derive(Clone, Debug)]
pub struct SpotifyEndpoints {
    pub api_base: String,
    pub token_url: String,
    pub embed_base: String,
}

impl Default for SpotifyEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            embed_base: "https://open.spotify.com/embed/track".to_string(),
        }
    }
}

pub struct SpotifyClient {
    http: Client,
    config: SpotifyConfig,
    endpoints: SpotifyEndpoints,
    token: RefCell<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Result<Self> {
        Self::with_endpoints(config, SpotifyEndpoints::default())
    }

    pub fn with_endpoints(config: SpotifyConfig, endpoints: SpotifyEndpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::http(SERVICE))?;

        Ok(Self {
            http,
            config,
            endpoints,
            token: RefCell::new(None),
        })
    }

    /// Fetch a token now so bad credentials fail before any batch work starts.
    pub fn authenticate(&self) -> Result<()> {
        self.bearer()?;
        Ok(())
    }

    fn bearer(&self) -> Result<String, ApiError> {
        if let Some(token) = self.token.borrow().as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token()?;
        let value = token.value.clone();
        *self.token.borrow_mut() = Some(token);
        Ok(value)
    }

    fn request_token(&self) -> Result<AccessToken, ApiError> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(ApiError::http(SERVICE))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ApiError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let token: TokenResponse = resp.json().map_err(ApiError::http(SERVICE))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_MARGIN);
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    fn send_with_retry<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 1..=max_attempts {
            let resp = build()?.send().map_err(ApiError::http(SERVICE))?;
            let status = resp.status();

            if status.is_success() {
                return Ok(resp);
            }

            let last = attempt == max_attempts;

            if status == StatusCode::UNAUTHORIZED && !last {
                // Token expired early; fetch a fresh one.
                self.token.replace(None);
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if last {
                    break;
                }
                let wait = retry_after(&resp).unwrap_or(backoff);
                eprintln!(
                    "  Spotify HTTP {} - waiting {:.1}s before retry {}/{}",
                    status.as_u16(),
                    wait.as_secs_f64(),
                    attempt,
                    max_attempts - 1
                );
                thread::sleep(wait);
                backoff = next_backoff(backoff);
                continue;
            }

            let body = resp.text().unwrap_or_default();
            return Err(ApiError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        Err(ApiError::RetriesExhausted {
            service: SERVICE,
            attempts: max_attempts,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let resp = self.send_with_retry(|| {
            let token = self.bearer()?;
            Ok(self.http.get(url).query(query).bearer_auth(token))
        })?;
        resp.json::<T>().map_err(ApiError::http(SERVICE))
    }

    /// Preview URL scraped from the public embed player, used when the Web API
    /// track object has none.
    fn embed_preview(&self, id: &TrackId) -> Result<Option<String>, ApiError> {
        let url = format!("{}/{}", self.endpoints.embed_base, id);
        let resp = match self.send_with_retry(|| Ok(self.http.get(&url))) {
            Ok(resp) => resp,
            Err(ApiError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let html = resp.text().map_err(ApiError::http(SERVICE))?;
        Ok(extract_embed_preview(&html))
    }
}

impl TrackResolver for SpotifyClient {
    fn resolve(&self, artist: &str, track: &str) -> Result<Resolution> {
        let query = format!("{} {}", track, artist);
        let response: SearchResponse = self.get_json(
            &format!("{}/search", self.endpoints.api_base),
            &[("q", query.as_str()), ("type", "track"), ("limit", "1")],
        )?;
        Ok(resolution_from_search(response))
    }
}

impl PreviewFetcher for SpotifyClient {
    fn preview_url(&self, id: &TrackId) -> Result<Option<String>> {
        let track: TrackObject = self.get_json(&format!("{}/tracks/{}", self.endpoints.api_base, id), &[])?;
        if let Some(url) = track.preview_url.filter(|u| !u.is_empty()) {
            return Ok(Some(url));
        }
        Ok(self.embed_preview(id)?)
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub(crate) fn resolution_from_search(response: SearchResponse) -> Resolution {
    response
        .tracks
        .items
        .into_iter()
        .next()
        .and_then(|item| item.id)
        .map(|id| Resolution::Resolved(TrackId(id)))
        .unwrap_or(Resolution::Unresolved)
}

pub(crate) fn extract_embed_preview(html: &str) -> Option<String> {
    EMBED_PREVIEW
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace("\\u002F", "/").replace("\\/", "/"))
        .filter(|url| !url.is_empty())
}
