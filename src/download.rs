//! Render slides and save them as files, with progress reporting.
//!
//! One slide goes through:
//!
//! ```text
//! preparing ─▶ rendering ─▶ downloading ─▶ complete
//!     └────────────┴─────────────┴──────▶ error
//! ```
//!
//! - **rendering**: acquire the profile and content images, compose the
//!   scene, capture it to PNG
//! - **downloading**: validate the PNG again (rebuilding it if broken), save
//!   it through the [`FileSink`] and verify what landed, retrying the save a
//!   few times
//!
//! [`Downloader::download_all`] runs slides one after the other with a pause
//! in between and reports cumulative progress. What happens on a failing
//! slide is the caller's choice ([`BatchPolicy`]). The last event of a batch
//! is `complete` only when every slide was saved, `error` otherwise.

use crate::acquire::{AcquireRequest, AcquisitionEngine, ImageSource};
use crate::capture::{CaptureEngine, CaptureError, ensure_valid};
use crate::compose::{Compositor, Scene, SlideParams};
use crate::config::{CarouselConfig, DownloadConfig};
use crate::naming::{CONTENT_MANIFEST_FILENAME, slide_filename};
use crate::types::{CarouselData, DownloadProgress, DownloadStatus, ImageRole};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("there are no slides to download")]
    Empty,
    #[error("slide {index} does not exist ({total} slides)")]
    NoSuchSlide { index: usize, total: usize },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("could not save {filename} after {attempts} attempts: {reason}")]
    Save {
        filename: String,
        attempts: u32,
        reason: String,
    },
    #[error("slide {} failed: {source}", .index + 1)]
    Slide {
        index: usize,
        #[source]
        source: Box<DownloadError>,
    },
}

/// What [`Downloader::download_all`] does when a slide fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Stop at the first failure and return it.
    #[default]
    AbortOnError,
    /// Record the failure and carry on with the next slide.
    ContinueOnError,
}

/// Destination for finished files.
pub trait FileSink: Send + Sync {
    /// Store `bytes` under `filename` and return where they went.
    fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf>;

    /// Check that `location` holds exactly `expected`.
    fn verify(&self, location: &Path, expected: &[u8]) -> io::Result<bool>;
}

/// Writes files into a directory through a temp file and a rename, so a
/// reader never sees a half-written slide.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(filename);
        let temp = self.dir.join(format!(".{filename}.part"));
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &target)?;
        Ok(target)
    }

    fn verify(&self, location: &Path, expected: &[u8]) -> io::Result<bool> {
        Ok(fs::read(location)? == expected)
    }
}

/// A captured slide that has not been saved yet.
#[derive(Debug, Clone)]
pub struct RenderedSlide {
    pub index: usize,
    pub filename: String,
    pub scene: Scene,
    pub png: Vec<u8>,
    pub renderer: String,
    pub repaired: bool,
    /// A placeholder stands in for the slide's content image.
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSlide {
    pub index: usize,
    pub filename: String,
    pub location: PathBuf,
    pub bytes: usize,
    pub renderer: String,
    pub repaired: bool,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub saved: Vec<SavedSlide>,
    pub failed: Vec<SlideFailure>,
    pub manifest: Option<PathBuf>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.saved.len() == self.total
    }

    pub fn fallbacks(&self) -> usize {
        self.saved.iter().filter(|s| s.fallback_used).count()
    }
}

/// Plain-text companion to the slide images: every slide's text, the
/// caption and hashtags, and how to post them.
pub fn content_manifest(carousel: &CarouselData) -> String {
    let mut out = format!(
        "Carousel by {} (@{})\n",
        carousel.display_name.trim(),
        carousel.handle.trim().trim_start_matches('@')
    );
    for (i, slide) in carousel.slides.iter().enumerate() {
        out.push_str(&format!("\nSlide {}:\n{}\n", i + 1, slide.text.trim()));
    }
    if !carousel.caption.trim().is_empty() {
        out.push_str(&format!("\nCaption:\n{}\n", carousel.caption.trim()));
    }
    if !carousel.hashtags.is_empty() {
        out.push_str(&format!("\nHashtags:\n{}\n", carousel.hashtags.join(" ")));
    }
    out.push_str(
        "\nHow to post:\n\
         1. Start a new post and select every slide image, slide-01 first.\n\
         2. Keep the order as shown by the file names.\n\
         3. Paste the caption and hashtags above.\n",
    );
    out
}

/// Progress reporting for one item inside a run of `total`.
struct Progress<'a> {
    position: usize,
    total: usize,
    report: &'a mut dyn FnMut(DownloadProgress),
}

impl Progress<'_> {
    fn emit(&mut self, status: DownloadStatus, message: impl Into<String>) {
        (self.report)(DownloadProgress::new(self.position, self.total, status).with_message(message));
    }
}

pub struct Downloader {
    acquisition: Arc<AcquisitionEngine>,
    compositor: Compositor,
    capture: CaptureEngine,
    sink: Arc<dyn FileSink>,
    pixel_ratio: f32,
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(
        acquisition: Arc<AcquisitionEngine>,
        compositor: Compositor,
        capture: CaptureEngine,
        sink: Arc<dyn FileSink>,
        pixel_ratio: f32,
        config: DownloadConfig,
    ) -> Self {
        Self {
            acquisition,
            compositor,
            capture,
            sink,
            pixel_ratio,
            config,
        }
    }

    pub fn from_config(
        config: &CarouselConfig,
        acquisition: Arc<AcquisitionEngine>,
        sink: Arc<dyn FileSink>,
    ) -> Self {
        Self::new(
            acquisition,
            Compositor::from_config(&config.canvas),
            CaptureEngine::from_config(&config.canvas),
            sink,
            config.canvas.pixel_ratio,
            config.download.clone(),
        )
    }

    /// Acquire, compose and capture one slide without saving it.
    pub async fn render_slide(
        &self,
        carousel: &CarouselData,
        index: usize,
    ) -> Result<RenderedSlide, DownloadError> {
        let slide = carousel.slides.get(index).ok_or(DownloadError::NoSuchSlide {
            index,
            total: carousel.slides.len(),
        })?;

        let mut requests = Vec::with_capacity(2);
        if let Some(url) = &slide.profile_image_url {
            requests.push(AcquireRequest::new(
                ImageSource::url(url),
                ImageRole::Profile,
                Some(carousel.display_name.as_str()),
            ));
        }
        if let Some(url) = slide.primary_image() {
            requests.push(AcquireRequest::new(
                ImageSource::url(url),
                ImageRole::Content,
                None,
            ));
        }
        let (mut profile, mut content) = (None, None);
        let results = self.acquisition.batch_acquire(&requests).await;
        for (request, result) in requests.iter().zip(results) {
            match request.role {
                ImageRole::Profile => profile = Some(result),
                ImageRole::Content => content = Some(result),
            }
        }
        let content_fallback = content.as_ref().is_some_and(|c| c.is_fallback());

        let composed = self
            .compositor
            .compose(&SlideParams {
                username: carousel.display_name.clone(),
                handle: carousel.handle.clone(),
                is_verified: carousel.is_verified,
                text: slide.text.clone(),
                profile_image: profile.map(|p| p.into_url()),
                content_image: content.map(|c| c.into_url()),
            })
            .await;

        let options = composed.scene.capture_options(self.pixel_ratio);
        let outcome = self.capture.capture(&composed.scene, &options)?;
        Ok(RenderedSlide {
            index,
            filename: slide_filename(index, &carousel.handle),
            scene: composed.scene,
            png: outcome.png,
            renderer: outcome.renderer,
            repaired: outcome.repaired,
            fallback_used: content_fallback || composed.fallback_used,
        })
    }

    /// Render and save the slide at `index`.
    pub async fn download_one(
        &self,
        carousel: &CarouselData,
        index: usize,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<SavedSlide, DownloadError> {
        let mut progress = Progress {
            position: 0,
            total: 1,
            report: on_progress,
        };
        progress.emit(DownloadStatus::Preparing, "Preparing slide");
        match self.process(carousel, index, &mut progress).await {
            Ok(saved) => {
                progress.position = 1;
                progress.emit(DownloadStatus::Complete, format!("Saved {}", saved.filename));
                Ok(saved)
            }
            Err(e) => {
                progress.emit(DownloadStatus::Error, e.to_string());
                Err(e)
            }
        }
    }

    /// Render and save every slide in order.
    pub async fn download_all(
        &self,
        carousel: &CarouselData,
        policy: BatchPolicy,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<BatchReport, DownloadError> {
        let total = carousel.slides.len();
        if total == 0 {
            return Err(DownloadError::Empty);
        }
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        let mut progress = Progress {
            position: 0,
            total,
            report: on_progress,
        };
        progress.emit(DownloadStatus::Preparing, format!("Preparing {total} slides"));

        for index in 0..total {
            if index > 0 {
                tokio::time::sleep(self.config.inter_item_delay()).await;
            }
            progress.position = index;
            match self.process(carousel, index, &mut progress).await {
                Ok(saved) => {
                    progress.position = index + 1;
                    progress.emit(
                        DownloadStatus::Downloading,
                        format!("Saved {} ({}/{total})", saved.filename, index + 1),
                    );
                    report.saved.push(saved);
                }
                Err(e) => {
                    warn!(slide = index + 1, error = %e, "slide failed");
                    progress.emit(DownloadStatus::Error, format!("Slide {}: {e}", index + 1));
                    if policy == BatchPolicy::AbortOnError {
                        return Err(DownloadError::Slide {
                            index,
                            source: Box::new(e),
                        });
                    }
                    report.failed.push(SlideFailure {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.config.write_manifest && !report.saved.is_empty() {
            let text = content_manifest(carousel);
            match self.save_verified(CONTENT_MANIFEST_FILENAME, text.as_bytes()).await {
                Ok(location) => report.manifest = Some(location),
                Err(e) => warn!(error = %e, "content manifest not written"),
            }
        }

        progress.position = total;
        if report.failed.is_empty() {
            progress.emit(
                DownloadStatus::Complete,
                format!("{} of {total} slides saved", report.saved.len()),
            );
        } else {
            progress.emit(
                DownloadStatus::Error,
                format!(
                    "{} of {total} slides saved, {} failed",
                    report.saved.len(),
                    report.failed.len()
                ),
            );
        }
        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            fallbacks = report.fallbacks(),
            "download finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        carousel: &CarouselData,
        index: usize,
        progress: &mut Progress<'_>,
    ) -> Result<SavedSlide, DownloadError> {
        progress.emit(DownloadStatus::Rendering, format!("Rendering slide {}", index + 1));
        let rendered = self.render_slide(carousel, index).await?;

        progress.emit(DownloadStatus::Downloading, format!("Saving {}", rendered.filename));
        let options = rendered.scene.capture_options(self.pixel_ratio);
        let (png, rebuilt) = ensure_valid(rendered.png, &rendered.scene, &options)?;
        let location = self.save_verified(&rendered.filename, &png).await?;

        Ok(SavedSlide {
            index,
            filename: rendered.filename,
            location,
            bytes: png.len(),
            renderer: rendered.renderer,
            repaired: rendered.repaired || rebuilt,
            fallback_used: rendered.fallback_used,
        })
    }

    async fn save_verified(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        let attempts = self.config.save_attempts.max(1);
        let mut reason = String::new();
        for attempt in 1..=attempts {
            let result = self.sink.save(filename, bytes).and_then(|location| {
                let ok = self.sink.verify(&location, bytes)?;
                Ok((location, ok))
            });
            match result {
                Ok((location, true)) => return Ok(location),
                Ok((_, false)) => reason = "saved file did not match".to_string(),
                Err(e) => reason = e.to_string(),
            }
            warn!(filename, attempt, of = attempts, %reason, "save failed");
            if attempt < attempts {
                tokio::time::sleep(self.config.save_retry_delay()).await;
            }
        }
        Err(DownloadError::Save {
            filename: filename.to_string(),
            attempts,
            reason,
        })
    }
}
