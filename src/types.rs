//! Shared data model: slides, the carousel aggregate, image results and
//! download progress.
//!
//! Slides and the carousel round-trip through JSON (`carousel.json` written
//! by `generate`, read by `render`) and through the text-generation endpoint,
//! so field names serialize in camelCase.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("no carousel is loaded")]
    NoCarousel,
    #[error("slide {0} not found")]
    SlideNotFound(u32),
    #[error("duplicate slide id {0}")]
    DuplicateSlideId(u32),
}

/// One unit of carousel content: text plus optional associated images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: u32,
    pub text: String,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    /// Index 0 is the primary image used for rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_generated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    /// Upstream decision from the text generator, carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_image: Option<bool>,
}

impl Slide {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            original_text: text.clone(),
            text,
            is_edited: false,
            profile_image_url: None,
            content_image_urls: None,
            custom_image_url: None,
            image_prompt: None,
            image_generated: None,
            fallback_used: None,
            needs_image: None,
        }
    }

    /// The image rendered under the text: a user-supplied custom image wins
    /// over the primary generated one.
    pub fn primary_image(&self) -> Option<&str> {
        self.custom_image_url
            .as_deref()
            .or_else(|| self.content_image_urls.as_ref()?.first().map(String::as_str))
    }

    /// Replace the text, tracking whether it diverges from the generated original.
    pub fn edit_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.is_edited = self.text != self.original_text;
    }

    pub fn revert_text(&mut self) {
        self.text = self.original_text.clone();
        self.is_edited = false;
    }

    /// Set the generated image list; an empty list clears it so index 0 always
    /// exists when the field is present.
    pub fn set_content_images(&mut self, urls: Vec<String>) {
        self.content_image_urls = if urls.is_empty() { None } else { Some(urls) };
    }

    pub fn wants_image(&self) -> bool {
        self.needs_image.unwrap_or(false) || self.image_prompt.is_some()
    }
}

/// Aggregate root for one wizard session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselData {
    pub display_name: String,
    pub handle: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub settings: GenerationSettings,
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Generation configuration captured by the wizard. Values are opaque to
/// this crate and forwarded to the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    pub content_type: String,
    pub content_format: String,
    pub slide_count: u32,
    pub call_to_action: String,
    pub custom_cta: Option<String>,
    pub copywriting_framework: String,
    pub target_audience: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            content_type: "educational".to_string(),
            content_format: "twitter".to_string(),
            slide_count: 5,
            call_to_action: "follow".to_string(),
            custom_cta: None,
            copywriting_framework: "aida".to_string(),
            target_audience: None,
        }
    }
}

impl CarouselData {
    pub fn new(display_name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            handle: handle.into(),
            is_verified: false,
            settings: GenerationSettings::default(),
            slides: Vec::new(),
            caption: String::new(),
            hashtags: Vec::new(),
        }
    }

    /// Check the slide-id uniqueness invariant.
    pub fn validate(&self) -> Result<(), SessionError> {
        let mut seen = HashSet::new();
        for slide in &self.slides {
            if !seen.insert(slide.id) {
                return Err(SessionError::DuplicateSlideId(slide.id));
            }
        }
        Ok(())
    }

    pub fn slide(&self, id: u32) -> Option<&Slide> {
        self.slides.iter().find(|s| s.id == id)
    }

    pub fn slide_mut(&mut self, id: u32) -> Result<&mut Slide, SessionError> {
        self.slides
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SessionError::SlideNotFound(id))
    }

    /// Apply one profile image to every slide.
    pub fn set_profile_image(&mut self, url: Option<String>) {
        for slide in &mut self.slides {
            slide.profile_image_url = url.clone();
        }
    }

    /// Replace the hashtags, normalizing the leading `#` and dropping duplicates
    /// while keeping first-seen order.
    pub fn set_hashtags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        self.hashtags = tags
            .into_iter()
            .filter_map(|t| {
                let bare = t.as_ref().trim().trim_start_matches('#');
                if bare.is_empty() {
                    return None;
                }
                let tag = format!("#{bare}");
                seen.insert(tag.to_lowercase()).then_some(tag)
            })
            .collect();
    }
}

// =============================================================================
// Image acquisition results
// =============================================================================

/// What an acquired image is used for; selects the placeholder flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Profile,
    Content,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Profile => write!(f, "profile"),
            ImageRole::Content => write!(f, "content"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMethod {
    Original,
    Base64,
    Proxy,
    Fallback,
}

impl fmt::Display for ImageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageMethod::Original => "original",
            ImageMethod::Base64 => "base64",
            ImageMethod::Proxy => "proxy",
            ImageMethod::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// A resolved, renderable image reference.
///
/// Fields are private so the flags can only be set through the constructors,
/// which keep `is_fallback` and `is_original` in step with `method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessingResult {
    url: String,
    is_original: bool,
    is_fallback: bool,
    method: ImageMethod,
}

impl ImageProcessingResult {
    pub fn original(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_original: true,
            is_fallback: false,
            method: ImageMethod::Original,
        }
    }

    /// An image converted to an embedded representation. `via_proxy` selects
    /// the `proxy` method.
    pub fn converted(url: impl Into<String>, via_proxy: bool) -> Self {
        Self {
            url: url.into(),
            is_original: false,
            is_fallback: false,
            method: if via_proxy {
                ImageMethod::Proxy
            } else {
                ImageMethod::Base64
            },
        }
    }

    pub fn fallback(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_original: false,
            is_fallback: true,
            method: ImageMethod::Fallback,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_url(self) -> String {
        self.url
    }

    pub fn is_original(&self) -> bool {
        self.is_original
    }

    pub fn is_fallback(&self) -> bool {
        self.is_fallback
    }

    pub fn method(&self) -> ImageMethod {
        self.method
    }
}

// =============================================================================
// Download progress
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Preparing,
    Rendering,
    Downloading,
    Complete,
    Error,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Preparing => "preparing",
            DownloadStatus::Rendering => "rendering",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of an in-flight download. Each update replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub current: usize,
    pub total: usize,
    pub status: DownloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DownloadProgress {
    pub fn new(current: usize, total: usize, status: DownloadStatus) -> Self {
        Self {
            current,
            total,
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
