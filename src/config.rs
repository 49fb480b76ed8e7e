//! Credentials and run configuration.
//!
//! Everything a component needs is loaded here once and passed in at
//! construction; nothing reads the environment after startup.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_RAW_CATALOG: &str = "lastfm_datasets/Last.fm_data.csv";
pub const DEFAULT_CATALOG_CACHE: &str = "lastfm_datasets/lastfm_data_unique.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "train_sets";
pub const DEFAULT_NUM_SIMILAR: usize = 2;
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Retry count of the search client for throttled / 5xx responses.
pub const SPOTIFY_MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set (add it to .env or export it)")]
    Missing(&'static str),

    #[error("Failed to load env file {path:?}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Load variables from an explicit env file, or from `.env` if present.
pub fn load_env(env_file: Option<&Path>) -> Result<(), ConfigError> {
    match env_file {
        Some(path) => dotenvy::from_path(path)
            .map(|_| ())
            .map_err(|source| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            }),
        None => {
            // A missing .env is fine; variables may come from the process environment.
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// Spotify
// ============================================================================

#[derive(Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub max_retries: u32,
}

impl SpotifyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            client_id: required(&lookup, "SPOTIPY_CLIENT_ID")?,
            client_secret: required(&lookup, "SPOTIPY_CLIENT_SECRET")?,
            max_retries: SPOTIFY_MAX_RETRIES,
        })
    }
}

impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

// ============================================================================
// Last.fm
// ============================================================================

/// Only `api_key` is sent with requests. The secret and account fields are
/// required and checked at startup but no authenticated call uses them.
#[derive(Clone)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
    /// MD5 hex digest of the account password, the form Last.fm auth expects.
    pub password_hash: String,
}

impl LastFmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let password = required(&lookup, "LASTFM_PASSWORD")?;
        Ok(Self {
            api_key: required(&lookup, "LASTFM_API_KEY")?,
            api_secret: required(&lookup, "LASTFM_API_SECRET")?,
            username: required(&lookup, "LASTFM_USERNAME")?,
            password_hash: format!("{:x}", md5::compute(password.as_bytes())),
        })
    }
}

impl fmt::Debug for LastFmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastFmConfig")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// URLs per dataset 2 row, primary included (N).
    pub num_similar: usize,
    pub chunk_size: usize,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>, num_similar: usize, chunk_size: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            num_similar: num_similar.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn dataset_1_path(&self) -> PathBuf {
        self.output_dir.join("dataset_1.csv")
    }

    pub fn dataset_2_path(&self) -> PathBuf {
        self.output_dir.join("dataset_2.csv")
    }

    /// Similar tracks requested per row (N-1).
    pub fn similar_limit(&self) -> usize {
        self.num_similar - 1
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR, DEFAULT_NUM_SIMILAR, DEFAULT_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_spotify_config_requires_both_values() {
        let err = SpotifyConfig::from_lookup(lookup_from(&[("SPOTIPY_CLIENT_ID", "id")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SPOTIPY_CLIENT_SECRET")));

        let config = SpotifyConfig::from_lookup(lookup_from(&[
            ("SPOTIPY_CLIENT_ID", "id"),
            ("SPOTIPY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.client_id, "id");
        assert_eq!(config.max_retries, SPOTIFY_MAX_RETRIES);
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = SpotifyConfig::from_lookup(lookup_from(&[
            ("SPOTIPY_CLIENT_ID", "  "),
            ("SPOTIPY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "SPOTIPY_CLIENT_ID is not set (add it to .env or export it)");
    }

    #[test]
    fn test_lastfm_password_is_md5_hashed() {
        let config = LastFmConfig::from_lookup(lookup_from(&[
            ("LASTFM_API_KEY", "key"),
            ("LASTFM_API_SECRET", "secret"),
            ("LASTFM_USERNAME", "listener"),
            ("LASTFM_PASSWORD", "password"),
        ]))
        .unwrap();
        assert_eq!(config.password_hash, "5f4dcc3b5aa765d61d8327deb882cf99");
        assert!(!format!("{:?}", config).contains("5f4dcc3b"));
    }

    #[test]
    fn test_missing_env_file_is_error() {
        let err = load_env(Some(Path::new("/nonexistent/.env"))).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }

    #[test]
    fn test_pipeline_paths_and_limit() {
        let config = PipelineConfig::new("train_sets", 3, 100);
        assert_eq!(config.dataset_1_path(), PathBuf::from("train_sets/dataset_1.csv"));
        assert_eq!(config.dataset_2_path(), PathBuf::from("train_sets/dataset_2.csv"));
        assert_eq!(config.similar_limit(), 2);
        assert_eq!(PipelineConfig::new("x", 0, 0).similar_limit(), 0);
    }
}
