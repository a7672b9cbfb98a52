//! Network seam for image acquisition.
//!
//! The engine only ever talks to a [`Fetcher`]. [`HttpFetcher`] is the
//! production implementation on `reqwest`; tests substitute a map of canned
//! responses.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("empty response body")]
    Empty,
    #[error("response is not an image (content type {})", .0.as_deref().unwrap_or("unknown"))]
    NotAnImage(Option<String>),
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("skipped: {0}")]
    Skipped(&'static str),
}

/// How the request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Plain cross-origin data fetch; the body is used as-is.
    Cors,
    /// Fetched the way an `<img>` element would, to be decoded to pixels.
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub mode: FetchMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedBytes {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform one GET. Non-2xx responses are returned, not turned into
    /// errors; transport failures are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedBytes, FetchError>;
}

/// `reqwest`-backed fetcher. Sends no cookies or credentials.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedBytes, FetchError> {
        let accept = match request.mode {
            FetchMode::Cors => "*/*",
            FetchMode::Image => "image/avif,image/webp,image/png,image/jpeg,image/*;q=0.8",
        };
        let response = self
            .client
            .get(&request.url)
            .header(ACCEPT, accept)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(request.timeout)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(request.timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        Ok(FetchedBytes {
            status,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
