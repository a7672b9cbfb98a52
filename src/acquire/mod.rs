//! Image acquisition: turn any image reference into something renderable.
//!
//! [`AcquisitionEngine::acquire`] never fails. It tries the configured
//! strategies in order and falls back to a synthetic placeholder:
//!
//! | Strategy | What it does | Result method |
//! |---|---|---|
//! | `embedded` | reference is already a `data:image/` URL, returned unchanged | `original` |
//! | `direct` | fetch bytes, check they are an image, embed as a data URL | `base64` |
//! | `proxy` | `direct` through the relay URL template | `proxy` |
//! | `raster` | fetch as an image load, decode, re-encode as PNG | `base64` |
//! | `raster_proxy` | `raster` through the relay | `proxy` |
//! | placeholder | initials avatar (profile) or neutral panel (content) | `fallback` |
//!
//! In-memory files skip the network: their bytes are embedded directly when
//! they sniff as an image. Every non-original result, placeholders included,
//! is cached.

pub mod fetch;

pub use fetch::{FetchError, FetchMode, FetchRequest, FetchedBytes, Fetcher, HttpFetcher};

use crate::cache::{AcquisitionStats, CacheKey, ImageCache, hash_bytes};
use crate::config::AcquisitionConfig;
use crate::fallback::first_success;
use crate::imaging::embed::{reencode_png, sniff_mime, to_data_url};
use crate::imaging::{content_placeholder, is_embedded, profile_avatar};
use crate::types::{ImageProcessingResult, ImageRole};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// One step of the acquisition cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireStrategy {
    Embedded,
    Direct,
    Proxy,
    Raster,
    RasterProxy,
}

impl AcquireStrategy {
    pub const ALL: [AcquireStrategy; 5] = [
        AcquireStrategy::Embedded,
        AcquireStrategy::Direct,
        AcquireStrategy::Proxy,
        AcquireStrategy::Raster,
        AcquireStrategy::RasterProxy,
    ];

    fn via_proxy(self) -> bool {
        matches!(self, AcquireStrategy::Proxy | AcquireStrategy::RasterProxy)
    }
}

impl fmt::Display for AcquireStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcquireStrategy::Embedded => "embedded",
            AcquireStrategy::Direct => "direct",
            AcquireStrategy::Proxy => "proxy",
            AcquireStrategy::Raster => "raster",
            AcquireStrategy::RasterProxy => "raster_proxy",
        };
        f.write_str(s)
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote URL or `data:` URL.
    Url(String),
    /// File already in memory (e.g. picked by the user).
    File { name: String, bytes: Vec<u8> },
}

impl ImageSource {
    pub fn url(url: impl Into<String>) -> Self {
        ImageSource::Url(url.into())
    }

    /// Identifier used for cache keys.
    fn cache_id(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::File { bytes, .. } => format!("file:{}", hash_bytes(bytes)),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) if is_embedded(url) => write!(f, "embedded image"),
            ImageSource::Url(url) => f.write_str(url),
            ImageSource::File { name, bytes } => write!(f, "file {name} ({} bytes)", bytes.len()),
        }
    }
}

/// One entry of [`AcquisitionEngine::batch_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub source: ImageSource,
    pub role: ImageRole,
    /// Display name used for initials when a profile placeholder is needed.
    pub hint: Option<String>,
}

impl AcquireRequest {
    pub fn new(source: ImageSource, role: ImageRole, hint: Option<&str>) -> Self {
        Self {
            source,
            role,
            hint: hint.map(str::to_string),
        }
    }
}

/// Build the relay URL for `url`. `{url}` in the template is replaced by the
/// percent-encoded source. Returns `None` when no relay is configured.
pub fn proxy_url(template: &str, url: &str) -> Option<String> {
    if template.is_empty() {
        return None;
    }
    let encoded = utf8_percent_encode(url, NON_ALPHANUMERIC).to_string();
    Some(template.replace("{url}", &encoded))
}

pub struct AcquisitionEngine {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<ImageCache>,
    config: AcquisitionConfig,
    stats: Mutex<AcquisitionStats>,
}

impl AcquisitionEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<ImageCache>, config: AcquisitionConfig) -> Self {
        Self {
            fetcher,
            cache,
            config,
            stats: Mutex::new(AcquisitionStats::default()),
        }
    }

    /// Production engine: HTTP fetcher and a fresh cache sized from config.
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(
            Arc::new(HttpFetcher::new()),
            Arc::new(ImageCache::new(config.cache_max_entries, config.cache_ttl())),
            config.clone(),
        )
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = AcquisitionStats::default();
    }

    fn record(&self, update: impl FnOnce(&mut AcquisitionStats)) {
        update(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// The placeholder `acquire` would fall back to for `role`.
    pub fn placeholder(&self, role: ImageRole, hint: Option<&str>) -> ImageProcessingResult {
        let image = match role {
            ImageRole::Profile => profile_avatar(hint.unwrap_or(""), self.config.avatar_size),
            ImageRole::Content => content_placeholder(self.config.placeholder_dimensions()),
        };
        ImageProcessingResult::fallback(image.data_url())
    }

    /// Resolve `source` to a renderable reference. Never fails.
    pub async fn acquire(
        &self,
        source: &ImageSource,
        role: ImageRole,
        hint: Option<&str>,
    ) -> ImageProcessingResult {
        let key = CacheKey::new(&source.cache_id(), role, hint);
        let embedded = matches!(source, ImageSource::Url(url) if is_embedded(url));
        if !embedded && let Some(hit) = self.cache.get(&key) {
            debug!(%source, %role, "image cache hit");
            self.record(|s| s.hit());
            return hit;
        }

        let result = match source {
            ImageSource::File { name, bytes } => match sniff_mime(bytes) {
                Some(mime) => ImageProcessingResult::converted(to_data_url(mime, bytes), false),
                None => {
                    warn!(file = %name, %role, "file is not a recognizable image, using placeholder");
                    self.placeholder(role, hint)
                }
            },
            ImageSource::Url(url) => {
                match first_success(self.config.strategies.iter().copied(), |strategy| {
                    self.run_strategy(strategy, url)
                })
                .await
                {
                    Ok((strategy, result)) => {
                        debug!(%strategy, %role, method = %result.method(), "image acquired");
                        result
                    }
                    Err(failed) => {
                        warn!(%source, %role, "{failed}, using placeholder");
                        self.placeholder(role, hint)
                    }
                }
            }
        };

        if !result.is_original() {
            self.cache.insert(key, result.clone());
        }
        let method = result.method();
        self.record(|s| s.resolved(method));
        result
    }

    /// Acquire every request concurrently. Output order matches input order;
    /// one failure never affects another.
    pub async fn batch_acquire(&self, requests: &[AcquireRequest]) -> Vec<ImageProcessingResult> {
        futures::future::join_all(
            requests
                .iter()
                .map(|r| self.acquire(&r.source, r.role, r.hint.as_deref())),
        )
        .await
    }

    async fn run_strategy(
        &self,
        strategy: AcquireStrategy,
        url: &str,
    ) -> Result<ImageProcessingResult, FetchError> {
        if strategy == AcquireStrategy::Embedded {
            return if is_embedded(url) {
                Ok(ImageProcessingResult::original(url))
            } else {
                Err(FetchError::Skipped("not an embedded image"))
            };
        }
        if is_embedded(url) {
            return Err(FetchError::Skipped("embedded images are not fetched"));
        }

        let target = if strategy.via_proxy() {
            proxy_url(&self.config.proxy_template, url)
                .ok_or(FetchError::Skipped("no proxy configured"))?
        } else {
            url.to_string()
        };

        let data_url = match strategy {
            AcquireStrategy::Direct | AcquireStrategy::Proxy => self.fetch_embed(&target).await?,
            _ => self.fetch_raster(&target).await?,
        };
        Ok(ImageProcessingResult::converted(data_url, strategy.via_proxy()))
    }

    async fn fetch_bytes(&self, url: &str, mode: FetchMode) -> Result<FetchedBytes, FetchError> {
        let timeout = self.config.fetch_timeout();
        let request = FetchRequest {
            url: url.to_string(),
            mode,
            timeout,
        };
        let fetched = tokio::time::timeout(timeout, self.fetcher.fetch(&request))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;
        if !fetched.is_success() {
            return Err(FetchError::Status(fetched.status));
        }
        if fetched.bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(fetched)
    }

    /// Fetch and embed the bytes as they are.
    async fn fetch_embed(&self, url: &str) -> Result<String, FetchError> {
        let fetched = self.fetch_bytes(url, FetchMode::Cors).await?;
        let mime = sniff_mime(&fetched.bytes).ok_or(FetchError::NotAnImage(fetched.content_type))?;
        Ok(to_data_url(mime, &fetched.bytes))
    }

    /// Fetch, decode to pixels off the async runtime, and re-encode as PNG.
    async fn fetch_raster(&self, url: &str) -> Result<String, FetchError> {
        let budget: Duration = self.config.raster_timeout();
        let work = async {
            let fetched = self.fetch_bytes(url, FetchMode::Image).await?;
            let embedded = tokio::task::spawn_blocking(move || reencode_png(&fetched.bytes))
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok::<_, FetchError>(embedded.data_url())
        };
        tokio::time::timeout(budget, work)
            .await
            .map_err(|_| FetchError::Timeout(budget))?
    }
}
