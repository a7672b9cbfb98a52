//! # Carousel Forge
//!
//! Generates Instagram-style carousels: slide text, caption and hashtags from a
//! hosted text model, optional per-slide images from a hosted image model, and
//! one PNG per slide styled like a social-media post.
//!
//! # Architecture: Resilient Pipeline
//!
//! ```text
//! 1. Generate   topic + identity  →  CarouselData     (remote text + images)
//! 2. Acquire    image references  →  embedded images  (fetch cascade, placeholders)
//! 3. Compose    slide + images    →  Scene            (post layout)
//! 4. Capture    Scene             →  PNG bytes        (renderer cascade, repair)
//! 5. Download   PNG bytes         →  slide-NN-*.png   (validate, save, verify)
//! ```
//!
//! Every stage that touches something unreliable has a fallback that ends in a
//! usable result. Unreachable images become deterministic placeholders, a
//! failing renderer gives way to the next one, and a broken PNG is rebuilt.
//! Only three places surface errors to the caller: text generation, capture
//! after every renderer and the repair have failed, and saving.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`generation`] | Text and image generation calls, prompt simplification, merging into slides |
//! | [`retry`] | Error classification and exponential backoff around remote calls |
//! | [`rate_limit`] | Fixed-window throttle shared by all remote calls |
//! | [`acquire`] | Strategy cascade turning an image reference into an embedded image |
//! | [`cache`] | Bounded TTL cache of acquisition results and acquisition counters |
//! | [`fallback`] | "First success wins" over an ordered list of strategies |
//! | [`compose`] | Post layout: avatar, name, badge, handle, wrapped text, content image |
//! | [`capture`] | Scene to validated PNG with renderer fallback and repair |
//! | [`download`] | Per-slide and batch render, save and progress reporting |
//! | [`imaging`] | Drawing surfaces, text metrics, PNG validation, data URLs, placeholders |
//! | [`session`] | The carousel being edited and its reset |
//! | [`types`] | Data model shared by every stage |
//! | [`naming`] | Output file names |
//! | [`config`] | `carousel.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Headless Rendering
//!
//! A slide is described once as a [`compose::Scene`], a flat list of drawable
//! elements, and handed to interchangeable [`imaging::Surface`]s. The vector
//! surface emits SVG and rasterizes it with `resvg`; the raster surface paints
//! paths, masks and glyph outlines straight onto a `tiny_skia` pixmap. Adding a renderer means implementing
//! `draw` and `export`.
//!
//! ## Images Travel as Data URLs
//!
//! Acquired images are re-encoded as PNG data URLs before they reach the
//! compositor. Rendering never waits on the network, and a cached result can
//! be reused across slides without refetching.
//!
//! ## Explicit Services
//!
//! The cache, the rate limiter and the acquisition counters are values owned by
//! whoever builds the pipeline, each with its own reset. Nothing is global, so
//! tests build isolated pipelines side by side.

pub mod acquire;
pub mod cache;
pub mod capture;
pub mod compose;
pub mod config;
pub mod download;
pub mod fallback;
pub mod generation;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
