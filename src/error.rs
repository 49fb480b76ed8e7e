//! Errors raised by the external service clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} error {code}: {message}")]
    Service {
        service: &'static str,
        code: i64,
        message: String,
    },

    #[error("{service} still unavailable after {attempts} attempts")]
    RetriesExhausted {
        service: &'static str,
        attempts: u32,
    },

    #[error("Spotify token request rejected: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ApiError::Http { service, source }
    }
}
