//! Shared test utilities: fixture images, canned carousels, and a scripted
//! [`Fetcher`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fetcher = MockFetcher::new()
//!     .with_ok("https://cdn.test/a.png", sample_png(4, 4))
//!     .with_status("https://cdn.test/b.png", 404);
//!
//! // ... run code against it ...
//! assert_eq!(fetcher.calls("https://cdn.test/a.png"), 1);
//! ```

use crate::acquire::{FetchError, FetchRequest, FetchedBytes, Fetcher};
use crate::config::CanvasConfig;
use crate::imaging::png::encode_rgba;
use crate::types::{CarouselData, Slide};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// =========================================================================
// Fixture images
// =========================================================================

/// A small PNG with a two-axis gradient so every pixel differs.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
            255,
        ])
    });
    encode_rgba(width, height, img.as_raw()).unwrap()
}

/// A small JPEG, for sources that are not already PNG.
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

// =========================================================================
// Carousels and config
// =========================================================================

/// A carousel with `n` slides, ids 1..=n.
pub fn sample_carousel(n: u32) -> CarouselData {
    let mut carousel = CarouselData::new("Ana Lima", "@analima");
    carousel.slides = (1..=n)
        .map(|id| Slide::new(id, format!("Slide {id}: one idea worth sharing.")))
        .collect();
    carousel.caption = "Five ideas in five slides.".into();
    carousel.set_hashtags(["rust", "tips"]);
    carousel
}

/// Canvas at a quarter of the default size and unit pixel ratio, to keep
/// renders fast.
pub fn small_canvas() -> CanvasConfig {
    CanvasConfig {
        width: 270,
        height: 338,
        pixel_ratio: 1.0,
        ..CanvasConfig::default()
    }
}

// =========================================================================
// MockFetcher
// =========================================================================

/// Fetcher that answers from a URL map and counts calls per URL.
///
/// Unknown URLs fail with a network error.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<FetchedBytes, FetchError>>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(
        mut self,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(FetchedBytes {
                status,
                content_type: content_type.map(str::to_string),
                bytes,
            }),
        );
        self
    }

    pub fn with_ok(self, url: &str, bytes: Vec<u8>) -> Self {
        self.with_response(url, 200, Some("image/png"), bytes)
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, status, Some("text/plain"), b"error".to_vec())
    }

    /// Sleep this long (tokio time) before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedBytes, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("no route to {}", request.url))))
    }
}
