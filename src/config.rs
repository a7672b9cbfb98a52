//! Configuration module.
//!
//! Handles loading, validating, and merging `carousel.toml`. Stock defaults
//! are the base layer; a user file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [endpoints]
//! text_url = "http://localhost:54321/functions/v1/generate-carousel"
//! image_url = "http://localhost:54321/functions/v1/generate-image"
//! api_key_env = "CAROUSEL_API_KEY"
//! request_timeout_secs = 60
//!
//! [rate_limit]
//! max_requests = 15         # Requests allowed per window and key
//! window_secs = 45
//! max_wait_secs = 30        # Cap on a single throttle wait
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! multiplier = 2.0
//! max_delay_ms = 10000
//!
//! [acquisition]
//! strategies = ["embedded", "direct", "proxy", "raster", "raster_proxy"]
//! proxy_template = "https://api.allorigins.win/raw?url={url}"
//! fetch_timeout_ms = 10000
//! raster_timeout_ms = 15000
//! cache_max_entries = 100
//! cache_ttl_secs = 1800
//! avatar_size = 400
//! placeholder_width = 1080
//! placeholder_height = 1080
//!
//! [canvas]
//! width = 1080
//! height = 1350
//! background = "#ffffff"
//! text_color = "#0f1419"
//! muted_color = "#536471"
//! accent_color = "#1d9bf0"
//! pixel_ratio = 2.0
//! min_capture_bytes = 5000
//! image_load_timeout_ms = 8000
//! renderers = ["vector", "raster"]
//!
//! [download]
//! inter_item_delay_ms = 500
//! save_attempts = 3
//! save_retry_delay_ms = 250
//! write_manifest = true
//!
//! [generation]
//! image_size = "1024x1024"
//! image_quality = "standard"
//! image_max_retries = 3
//! standard_delay_ms = 2500
//! success_delay_ms = 1000
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::acquire::AcquireStrategy;
use crate::capture::RendererKind;
use crate::imaging::{Color, Size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration loaded from `carousel.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CarouselConfig {
    /// Remote generation endpoints.
    pub endpoints: EndpointsConfig,
    /// Fixed-window throttling of generation calls.
    pub rate_limit: RateLimitConfig,
    /// Backoff for the text generation call.
    pub retry: RetryConfig,
    /// Image acquisition cascade and cache.
    pub acquisition: AcquisitionConfig,
    /// Slide canvas, colors and capture settings.
    pub canvas: CanvasConfig,
    /// Saving rendered slides.
    pub download: DownloadConfig,
    /// Per-slide image generation.
    pub generation: GenerationConfig,
}

impl CarouselConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.window_secs must be non-zero".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "retry.multiplier must be >= 1.0".into(),
            ));
        }
        if !self.acquisition.proxy_template.is_empty()
            && !self.acquisition.proxy_template.contains("{url}")
        {
            return Err(ConfigError::Validation(
                "acquisition.proxy_template must contain {url}".into(),
            ));
        }
        if self.acquisition.cache_max_entries == 0 {
            return Err(ConfigError::Validation(
                "acquisition.cache_max_entries must be at least 1".into(),
            ));
        }
        let acq = &self.acquisition;
        for (key, value) in [
            ("acquisition.avatar_size", acq.avatar_size),
            ("acquisition.placeholder_width", acq.placeholder_width),
            ("acquisition.placeholder_height", acq.placeholder_height),
        ] {
            if value == 0 || value > 4096 {
                return Err(ConfigError::Validation(format!(
                    "{key} must be 1-4096, got {value}"
                )));
            }
        }
        let canvas = &self.canvas;
        if canvas.width == 0 || canvas.height == 0 || canvas.width > 4096 || canvas.height > 4096 {
            return Err(ConfigError::Validation(
                "canvas.width and canvas.height must be 1-4096".into(),
            ));
        }
        if !(canvas.pixel_ratio > 0.0 && canvas.pixel_ratio <= 4.0) {
            return Err(ConfigError::Validation(
                "canvas.pixel_ratio must be in (0, 4]".into(),
            ));
        }
        if canvas.renderers.is_empty() {
            return Err(ConfigError::Validation(
                "canvas.renderers must not be empty".into(),
            ));
        }
        for (key, value) in [
            ("canvas.background", &canvas.background),
            ("canvas.text_color", &canvas.text_color),
            ("canvas.muted_color", &canvas.muted_color),
            ("canvas.accent_color", &canvas.accent_color),
        ] {
            if Color::parse_hex(value).is_none() {
                return Err(ConfigError::Validation(format!(
                    "{key} is not a hex color: {value}"
                )));
            }
        }
        if self.download.save_attempts == 0 {
            return Err(ConfigError::Validation(
                "download.save_attempts must be at least 1".into(),
            ));
        }
        if self.generation.image_dimensions().is_none() {
            return Err(ConfigError::Validation(format!(
                "generation.image_size must look like 1024x1024, got {}",
                self.generation.image_size
            )));
        }
        Ok(())
    }
}

/// Remote generation endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointsConfig {
    /// Text (slides, caption, hashtags) generation endpoint.
    pub text_url: String,
    /// Image generation endpoint.
    pub image_url: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    /// Whole-request timeout for generation calls.
    pub request_timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            text_url: "http://localhost:54321/functions/v1/generate-carousel".to_string(),
            image_url: "http://localhost:54321/functions/v1/generate-image".to_string(),
            api_key_env: "CAROUSEL_API_KEY".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl EndpointsConfig {
    /// Read the API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Fixed-window throttling of generation calls, per endpoint key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Longest a single `throttle` call may wait.
    pub max_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 15,
            window_secs: 45,
            max_wait_secs: 30,
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// Image acquisition cascade and cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Strategies tried in order. The placeholder always runs last.
    pub strategies: Vec<AcquireStrategy>,
    /// Cross-origin relay; `{url}` is replaced by the percent-encoded source.
    /// Empty disables the proxy strategies.
    pub proxy_template: String,
    pub fetch_timeout_ms: u64,
    pub raster_timeout_ms: u64,
    pub cache_max_entries: usize,
    pub cache_ttl_secs: u64,
    /// Edge length of generated avatar placeholders.
    pub avatar_size: u32,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            strategies: AcquireStrategy::ALL.to_vec(),
            proxy_template: "https://api.allorigins.win/raw?url={url}".to_string(),
            fetch_timeout_ms: 10_000,
            raster_timeout_ms: 15_000,
            cache_max_entries: 100,
            cache_ttl_secs: 1800,
            avatar_size: 400,
            placeholder_width: 1080,
            placeholder_height: 1080,
        }
    }
}

impl AcquisitionConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn raster_timeout(&self) -> Duration {
        Duration::from_millis(self.raster_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn placeholder_dimensions(&self) -> Size {
        Size::new(self.placeholder_width, self.placeholder_height)
    }
}

/// Slide canvas, palette and capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub text_color: String,
    pub muted_color: String,
    pub accent_color: String,
    /// Output scale; a 1080-wide canvas at 2.0 exports 2160 pixels wide.
    pub pixel_ratio: f32,
    /// Captures smaller than this are treated as blank and re-rendered.
    pub min_capture_bytes: usize,
    pub image_load_timeout_ms: u64,
    /// Renderers tried in order when capturing a slide.
    pub renderers: Vec<RendererKind>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1350,
            background: "#ffffff".to_string(),
            text_color: "#0f1419".to_string(),
            muted_color: "#536471".to_string(),
            accent_color: "#1d9bf0".to_string(),
            pixel_ratio: 2.0,
            min_capture_bytes: 5000,
            image_load_timeout_ms: 8000,
            renderers: vec![RendererKind::Vector, RendererKind::Raster],
        }
    }
}

impl CanvasConfig {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn image_load_timeout(&self) -> Duration {
        Duration::from_millis(self.image_load_timeout_ms)
    }
}

/// Saving rendered slides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Pause between slides in a batch.
    pub inter_item_delay_ms: u64,
    pub save_attempts: u32,
    pub save_retry_delay_ms: u64,
    /// Write `carousel-content.txt` after a batch.
    pub write_manifest: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 500,
            save_attempts: 3,
            save_retry_delay_ms: 250,
            write_manifest: true,
        }
    }
}

impl DownloadConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn save_retry_delay(&self) -> Duration {
        Duration::from_millis(self.save_retry_delay_ms)
    }
}

/// Per-slide image generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Requested image size as `WxH`.
    pub image_size: String,
    pub image_quality: String,
    pub image_max_retries: u32,
    /// Delay between slides after a fallback (and before the first success).
    pub standard_delay_ms: u64,
    /// Shortened delay after a successful generation.
    pub success_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            image_size: "1024x1024".to_string(),
            image_quality: "standard".to_string(),
            image_max_retries: 3,
            standard_delay_ms: 2500,
            success_delay_ms: 1000,
        }
    }
}

impl GenerationConfig {
    /// Parse `image_size` (`"1024x1024"`) into dimensions.
    pub fn image_dimensions(&self) -> Option<Size> {
        let (w, h) = self.image_size.split_once(['x', 'X'])?;
        let width = w.trim().parse().ok().filter(|&v| v > 0)?;
        let height = h.trim().parse().ok().filter(|&v| v > 0)?;
        Some(Size::new(width, height))
    }

    pub fn standard_delay(&self) -> Duration {
        Duration::from_millis(self.standard_delay_ms)
    }

    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CarouselConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CarouselConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CarouselConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<CarouselConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `carousel.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Carousel Forge Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Generation endpoints
# ---------------------------------------------------------------------------
[endpoints]
text_url = "http://localhost:54321/functions/v1/generate-carousel"
image_url = "http://localhost:54321/functions/v1/generate-image"
# Environment variable holding the bearer token sent to both endpoints.
api_key_env = "CAROUSEL_API_KEY"
request_timeout_secs = 60

# ---------------------------------------------------------------------------
# Throttling: at most max_requests calls per window, per endpoint.
# ---------------------------------------------------------------------------
[rate_limit]
max_requests = 15
window_secs = 45
# A single wait never exceeds this, even if the window has longer to run.
max_wait_secs = 30

# ---------------------------------------------------------------------------
# Retry with exponential backoff: min(base * multiplier^attempt, max)
# ---------------------------------------------------------------------------
[retry]
max_retries = 3
base_delay_ms = 1000
multiplier = 2.0
max_delay_ms = 10000

# ---------------------------------------------------------------------------
# Image acquisition
# ---------------------------------------------------------------------------
[acquisition]
# Tried in order; a generated placeholder always follows the last one.
strategies = ["embedded", "direct", "proxy", "raster", "raster_proxy"]
# Cross-origin relay. {url} is replaced by the percent-encoded image URL.
# Set to "" to disable the proxy strategies.
proxy_template = "https://api.allorigins.win/raw?url={url}"
fetch_timeout_ms = 10000
raster_timeout_ms = 15000
cache_max_entries = 100
cache_ttl_secs = 1800
avatar_size = 400
placeholder_width = 1080
placeholder_height = 1080

# ---------------------------------------------------------------------------
# Slide canvas and capture
# ---------------------------------------------------------------------------
[canvas]
width = 1080
height = 1350
background = "#ffffff"
text_color = "#0f1419"
muted_color = "#536471"
accent_color = "#1d9bf0"
pixel_ratio = 2.0
# Captures smaller than this many bytes are treated as blank.
min_capture_bytes = 5000
image_load_timeout_ms = 8000
renderers = ["vector", "raster"]

# ---------------------------------------------------------------------------
# Saving slides
# ---------------------------------------------------------------------------
[download]
inter_item_delay_ms = 500
save_attempts = 3
save_retry_delay_ms = 250
write_manifest = true

# ---------------------------------------------------------------------------
# Per-slide image generation
# ---------------------------------------------------------------------------
[generation]
image_size = "1024x1024"
image_quality = "standard"
image_max_retries = 3
standard_delay_ms = 2500
success_delay_ms = 1000
"##
}
