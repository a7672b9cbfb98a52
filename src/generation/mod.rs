//! Carousel generation: slide text from the text service, then one image
//! per slide that asks for it.
//!
//! Every remote call goes through the per-function [`RateLimiter`] and
//! [`with_retry`]. Text failures surface as [`GenerationError`]. Image
//! failures never do: after the retries (each with a plainer prompt, see
//! [`prompts`]) the slide gets a content placeholder and `fallback_used`.
//!
//! Batch image generation is strictly sequential with a pause between
//! requests. The pause is shortened after a success and goes back to the
//! standard delay after a fallback.

pub mod client;
pub mod prompts;

pub use client::{
    GeneratedContent, HttpImageGenerator, HttpTextGenerator, IMAGE_FUNCTION, ImageGenerator,
    ImageRequest, TEXT_FUNCTION, TextGenerator, TextRequest,
};

use crate::config::{CarouselConfig, GenerationConfig};
use crate::imaging::{Size, content_placeholder};
use crate::rate_limit::RateLimiter;
use crate::retry::{EdgeFunctionError, RetryPolicy, with_retry};
use crate::types::{CarouselData, GenerationSettings, SessionError, Slide};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum GenerationError {
    /// A terminal upstream failure (quota, content policy).
    #[error("{}", .0.user_message())]
    Upstream(EdgeFunctionError),
    #[error("{message} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        message: String,
        last: EdgeFunctionError,
    },
    #[error("{function} returned an unusable response: {reason}")]
    InvalidResponse {
        function: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("could not set up HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl GenerationError {
    /// The classified upstream error behind this failure, if any.
    pub fn upstream(&self) -> Option<&EdgeFunctionError> {
        match self {
            GenerationError::Upstream(e) | GenerationError::RetriesExhausted { last: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// Everything needed to generate a carousel.
#[derive(Debug, Clone, PartialEq)]
pub struct CarouselRequest {
    pub display_name: String,
    pub handle: String,
    pub is_verified: bool,
    pub title: Option<String>,
    /// Topic or source material for the slides.
    pub content: String,
    pub settings: GenerationSettings,
    pub profile_image_url: Option<String>,
    /// Also generate images for slides that ask for one.
    pub with_images: bool,
}

impl CarouselRequest {
    pub fn text_request(&self) -> TextRequest {
        let s = &self.settings;
        TextRequest {
            title: self.title.clone(),
            username: self.display_name.clone(),
            content: self.content.clone(),
            instagram_handle: self.handle.clone(),
            is_verified: self.is_verified,
            slide_count: s.slide_count,
            content_type: s.content_type.clone(),
            content_format: s.content_format.clone(),
            call_to_action: s.call_to_action.clone(),
            custom_cta: s.custom_cta.clone(),
            copywriting_framework: s.copywriting_framework.clone(),
            target_audience: s.target_audience.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// URL or data URL of the image.
    pub reference: String,
    pub fallback_used: bool,
}

/// Outcome counts of [`CarouselGenerator::generate_images`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageBatch {
    pub generated: usize,
    pub fallbacks: usize,
}

impl ImageBatch {
    pub fn requested(&self) -> usize {
        self.generated + self.fallbacks
    }

    /// Recount from slides that already went through image generation.
    pub fn from_slides(slides: &[Slide]) -> Self {
        slides.iter().fold(Self::default(), |mut batch, slide| {
            match (slide.image_generated, slide.fallback_used) {
                (_, Some(true)) => batch.fallbacks += 1,
                (Some(true), _) => batch.generated += 1,
                _ => {}
            }
            batch
        })
    }
}

pub struct CarouselGenerator {
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    limiter: Arc<RateLimiter>,
    text_retry: RetryPolicy,
    image_retry: RetryPolicy,
    config: GenerationConfig,
}

impl CarouselGenerator {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        limiter: Arc<RateLimiter>,
        config: &CarouselConfig,
    ) -> Self {
        let text_retry = RetryPolicy::from_config(&config.retry);
        Self {
            text,
            images,
            limiter,
            image_retry: text_retry
                .clone()
                .with_max_retries(config.generation.image_max_retries),
            text_retry,
            config: config.generation.clone(),
        }
    }

    /// Production generator talking to the configured endpoints.
    pub fn from_config(config: &CarouselConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.endpoints.request_timeout())
            .build()?;
        let api_key = config.endpoints.api_key();
        Ok(Self::new(
            Arc::new(HttpTextGenerator::new(
                client.clone(),
                &config.endpoints.text_url,
                api_key.clone(),
            )),
            Arc::new(HttpImageGenerator::new(
                client,
                &config.endpoints.image_url,
                api_key,
            )),
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            config,
        ))
    }

    /// Dimensions requested for generated images.
    pub fn image_dimensions(&self) -> Size {
        self.config
            .image_dimensions()
            .unwrap_or(Size::new(1024, 1024))
    }

    /// Slides, caption and hashtags for `request`.
    ///
    /// Slides come back with `original_text` filled in and unique ids; an
    /// empty slide list is an error.
    pub async fn generate_text(
        &self,
        request: &TextRequest,
    ) -> Result<GeneratedContent, GenerationError> {
        info!(slides = request.slide_count, "generating carousel text");
        let mut content = with_retry(TEXT_FUNCTION, &self.text_retry, |_| async move {
            self.limiter.throttle(TEXT_FUNCTION).await;
            self.text.generate(request).await
        })
        .await?;

        if content.slides.is_empty() {
            return Err(GenerationError::InvalidResponse {
                function: TEXT_FUNCTION,
                reason: "no slides".to_string(),
            });
        }
        normalize_slides(&mut content.slides);
        Ok(content)
    }

    /// One image for `prompt`. Never fails: retries with plainer prompts,
    /// then falls back to a placeholder.
    pub async fn generate_image(&self, prompt: &str, dimensions: Size) -> GeneratedImage {
        let variants = prompts::prompt_variants(prompt);
        let size = dimensions.to_string();
        let result = with_retry(IMAGE_FUNCTION, &self.image_retry, |attempt| {
            let index = (attempt as usize).min(variants.len() - 1);
            let request = ImageRequest {
                prompt: variants[index].clone(),
                size: size.clone(),
                quality: self.config.image_quality.clone(),
            };
            async move {
                self.limiter.throttle(IMAGE_FUNCTION).await;
                self.images.generate(&request).await
            }
        })
        .await;

        match result {
            Ok(reference) => GeneratedImage {
                reference,
                fallback_used: false,
            },
            Err(e) => {
                warn!(error = %e, "image generation failed, using placeholder");
                GeneratedImage {
                    reference: content_placeholder(dimensions).data_url(),
                    fallback_used: true,
                }
            }
        }
    }

    /// Generate images for the slides that want one, in order, one at a time.
    ///
    /// A slide wants an image when the text service flagged it with
    /// `needsImage` or gave it an image prompt. The prompt falls back to the
    /// slide text.
    pub async fn generate_images(&self, slides: &mut [Slide], dimensions: Size) -> ImageBatch {
        let mut batch = ImageBatch::default();
        let mut delay = self.config.standard_delay();
        for slide in slides.iter_mut().filter(|s| s.wants_image()) {
            if batch.requested() > 0 {
                tokio::time::sleep(delay).await;
            }
            let prompt = slide
                .image_prompt
                .clone()
                .unwrap_or_else(|| slide.text.clone());
            let image = self.generate_image(&prompt, dimensions).await;
            apply_image(slide, &prompt, &image);
            if image.fallback_used {
                batch.fallbacks += 1;
                delay = self.config.standard_delay();
            } else {
                batch.generated += 1;
                delay = self.config.success_delay();
            }
        }
        info!(generated = batch.generated, fallbacks = batch.fallbacks, "slide images done");
        batch
    }

    /// Text and, if asked, images merged into a validated carousel.
    pub async fn generate_carousel(
        &self,
        request: &CarouselRequest,
    ) -> Result<CarouselData, GenerationError> {
        let content = self.generate_text(&request.text_request()).await?;

        let mut carousel = CarouselData::new(&request.display_name, &request.handle);
        carousel.is_verified = request.is_verified;
        carousel.settings = request.settings.clone();
        carousel.slides = content.slides;
        carousel.caption = content.caption;
        carousel.set_hashtags(&content.hashtags);
        carousel.set_profile_image(request.profile_image_url.clone());

        if request.with_images {
            let dimensions = self.image_dimensions();
            self.generate_images(&mut carousel.slides, dimensions).await;
        }
        carousel.validate()?;
        Ok(carousel)
    }

    /// Replace one slide's image. `prompt` overrides the slide's stored
    /// prompt; a user-supplied custom image is cleared so the new one shows.
    pub async fn regenerate_slide_image(
        &self,
        carousel: &mut CarouselData,
        slide_id: u32,
        prompt: Option<&str>,
    ) -> Result<GeneratedImage, GenerationError> {
        let prompt = {
            let slide = carousel.slide_mut(slide_id)?;
            prompt
                .map(str::to_string)
                .or_else(|| slide.image_prompt.clone())
                .unwrap_or_else(|| slide.text.clone())
        };
        let image = self.generate_image(&prompt, self.image_dimensions()).await;
        let slide = carousel.slide_mut(slide_id)?;
        apply_image(slide, &prompt, &image);
        slide.custom_image_url = None;
        Ok(image)
    }
}

fn apply_image(slide: &mut Slide, prompt: &str, image: &GeneratedImage) {
    slide.image_prompt = Some(prompt.to_string());
    slide.set_content_images(vec![image.reference.clone()]);
    slide.image_generated = Some(!image.fallback_used);
    slide.fallback_used = Some(image.fallback_used);
}

/// Fill `original_text`, clear edit flags and renumber on duplicate ids.
fn normalize_slides(slides: &mut [Slide]) {
    let mut seen = HashSet::new();
    let duplicates = slides.iter().any(|s| !seen.insert(s.id));
    if duplicates {
        warn!("text service returned duplicate slide ids, renumbering");
    }
    for (index, slide) in slides.iter_mut().enumerate() {
        if duplicates {
            slide.id = index as u32 + 1;
        }
        if slide.original_text.is_empty() {
            slide.original_text = slide.text.clone();
        }
        slide.is_edited = slide.text != slide.original_text;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::embed::parse_data_url;
    use crate::retry::{ErrorKind, classify};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Answers from a queue; an empty queue repeats the `default`.
    struct ScriptedText {
        replies: Mutex<VecDeque<Result<GeneratedContent, EdgeFunctionError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedText {
        fn new(replies: Vec<Result<GeneratedContent, EdgeFunctionError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedText {
        async fn generate(&self, _: &TextRequest) -> Result<GeneratedContent, EdgeFunctionError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(classify(TEXT_FUNCTION, "script ran out", Some(500))))
        }
    }

    struct ScriptedImages {
        replies: Mutex<VecDeque<Result<String, EdgeFunctionError>>>,
        prompts: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedImages {
        fn new(replies: Vec<Result<String, EdgeFunctionError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
        }

        fn times(&self) -> Vec<Instant> {
            self.prompts.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl ImageGenerator for ScriptedImages {
        async fn generate(&self, request: &ImageRequest) -> Result<String, EdgeFunctionError> {
            self.prompts
                .lock()
                .unwrap()
                .push((request.prompt.clone(), Instant::now()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("https://img.test/default.png".to_string()))
        }
    }

    fn content(n: u32) -> GeneratedContent {
        GeneratedContent {
            slides: (1..=n)
                .map(|id| Slide {
                    original_text: String::new(),
                    ..Slide::new(id, format!("Point {id}"))
                })
                .collect(),
            caption: "caption".into(),
            hashtags: vec!["growth".into(), "#growth".into()],
        }
    }

    fn config() -> CarouselConfig {
        let mut config = CarouselConfig::default();
        config.generation.image_size = "64x48".into();
        config
    }

    fn generator(text: Arc<ScriptedText>, images: Arc<ScriptedImages>) -> CarouselGenerator {
        CarouselGenerator::new(
            text,
            images,
            Arc::new(RateLimiter::new(100, Duration::from_secs(45), Duration::from_secs(30))),
            &config(),
        )
    }

    fn request() -> CarouselRequest {
        CarouselRequest {
            display_name: "Ana Lima".into(),
            handle: "@analima".into(),
            is_verified: true,
            title: Some("Habits".into()),
            content: "Tiny habits".into(),
            settings: GenerationSettings::default(),
            profile_image_url: Some("https://cdn.test/me.png".into()),
            with_images: false,
        }
    }

    // =========================================================================
    // Text
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn text_is_normalized() {
        let text = Arc::new(ScriptedText::new(vec![Ok(content(2))]));
        let g = generator(text, Arc::new(ScriptedImages::new(vec![])));
        let out = g.generate_text(&request().text_request()).await.unwrap();
        assert_eq!(out.slides[0].original_text, "Point 1");
        assert!(!out.slides[0].is_edited);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_error_fails_immediately() {
        let text = Arc::new(ScriptedText::new(vec![Err(classify(
            TEXT_FUNCTION,
            "You exceeded your current quota",
            Some(429),
        ))]));
        let g = generator(text.clone(), Arc::new(ScriptedImages::new(vec![])));
        let start = Instant::now();
        let err = g.generate_text(&request().text_request()).await.unwrap_err();

        assert_eq!(*text.calls.lock().unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(err.upstream().unwrap().kind, ErrorKind::Quota);
        assert_eq!(err.to_string(), ErrorKind::Quota.user_message());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_text_errors_are_retried() {
        let text = Arc::new(ScriptedText::new(vec![
            Err(classify(TEXT_FUNCTION, "bad gateway", Some(502))),
            Ok(content(1)),
        ]));
        let g = generator(text.clone(), Arc::new(ScriptedImages::new(vec![])));
        assert!(g.generate_text(&request().text_request()).await.is_ok());
        assert_eq!(*text.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_attempts() {
        let text = Arc::new(ScriptedText::new(vec![]));
        let g = generator(text.clone(), Arc::new(ScriptedImages::new(vec![])));
        let err = g.generate_text(&request().text_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::RetriesExhausted { attempts: 4, .. }));
        assert!(err.to_string().contains("gave up after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slide_list_is_invalid() {
        let text = Arc::new(ScriptedText::new(vec![Ok(content(0))]));
        let g = generator(text, Arc::new(ScriptedImages::new(vec![])));
        let err = g.generate_text(&request().text_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }

    #[test]
    fn duplicate_ids_are_renumbered() {
        let mut slides = vec![Slide::new(1, "a"), Slide::new(1, "b"), Slide::new(7, "c")];
        normalize_slides(&mut slides);
        let ids: Vec<u32> = slides.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    // =========================================================================
    // Images
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn retries_use_simpler_prompts() {
        let images = Arc::new(ScriptedImages::new(vec![
            Err(classify(IMAGE_FUNCTION, "upstream timeout", Some(504))),
            Err(classify(IMAGE_FUNCTION, "upstream timeout", Some(504))),
            Ok("https://img.test/ok.png".into()),
        ]));
        let g = generator(Arc::new(ScriptedText::new(vec![])), images.clone());
        let prompt = "A photo of a lighthouse at dusk, cinematic, highly detailed. Moody.";
        let image = g.generate_image(prompt, Size::new(64, 48)).await;

        assert!(!image.fallback_used);
        assert_eq!(image.reference, "https://img.test/ok.png");
        assert_eq!(images.prompts(), prompts::prompt_variants(prompt)[..3].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn content_policy_falls_back_without_retry() {
        let images = Arc::new(ScriptedImages::new(vec![Err(classify(
            IMAGE_FUNCTION,
            "Your request was rejected as a result of our safety system",
            Some(400),
        ))]));
        let g = generator(Arc::new(ScriptedText::new(vec![])), images.clone());
        let image = g.generate_image("anything", Size::new(64, 48)).await;

        assert!(image.fallback_used);
        assert_eq!(images.prompts().len(), 1);
        let decoded = parse_data_url(&image.reference).unwrap();
        assert_eq!(decoded.mime, "image/png");
    }

    #[tokio::test(start_paused = true)]
    async fn batch_only_touches_slides_that_want_images() {
        let images = Arc::new(ScriptedImages::new(vec![]));
        let g = generator(Arc::new(ScriptedText::new(vec![])), images.clone());
        let mut slides = vec![Slide::new(1, "a"), Slide::new(2, "b"), Slide::new(3, "c")];
        slides[0].needs_image = Some(true);
        slides[2].image_prompt = Some("a red kite".into());

        let batch = g.generate_images(&mut slides, Size::new(64, 48)).await;
        assert_eq!(batch, ImageBatch { generated: 2, fallbacks: 0 });
        assert_eq!(images.prompts(), vec!["a", "a red kite"]);
        assert_eq!(slides[0].primary_image(), Some("https://img.test/default.png"));
        assert_eq!(slides[0].image_generated, Some(true));
        assert_eq!(slides[1].content_image_urls, None);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_shortens_after_success_and_resets_after_fallback() {
        let terminal = || Err(classify(IMAGE_FUNCTION, "billing hard limit", Some(400)));
        let images = Arc::new(ScriptedImages::new(vec![
            Ok("https://img.test/1.png".into()),
            terminal(),
            Ok("https://img.test/3.png".into()),
        ]));
        let g = generator(Arc::new(ScriptedText::new(vec![])), images.clone());
        let mut slides: Vec<Slide> = (1..=3)
            .map(|id| Slide {
                needs_image: Some(true),
                ..Slide::new(id, "x")
            })
            .collect();

        let batch = g.generate_images(&mut slides, Size::new(64, 48)).await;
        assert_eq!(batch, ImageBatch { generated: 2, fallbacks: 1 });
        assert_eq!(slides[1].fallback_used, Some(true));

        let t = images.times();
        assert_eq!(t[1] - t[0], Duration::from_millis(1000));
        assert_eq!(t[2] - t[1], Duration::from_millis(2500));
    }

    // =========================================================================
    // Carousel
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn carousel_merges_text_identity_and_images() {
        let mut generated = content(2);
        generated.slides[1].needs_image = Some(true);
        let text = Arc::new(ScriptedText::new(vec![Ok(generated)]));
        let images = Arc::new(ScriptedImages::new(vec![]));
        let g = generator(text, images.clone());

        let carousel = g
            .generate_carousel(&CarouselRequest {
                with_images: true,
                ..request()
            })
            .await
            .unwrap();

        assert_eq!(carousel.display_name, "Ana Lima");
        assert!(carousel.is_verified);
        assert_eq!(carousel.hashtags, vec!["#growth"]);
        assert!(carousel
            .slides
            .iter()
            .all(|s| s.profile_image_url.as_deref() == Some("https://cdn.test/me.png")));
        assert_eq!(carousel.slides[1].image_generated, Some(true));
        assert_eq!(images.prompts(), vec!["Point 2"]);
        assert_eq!(
            ImageBatch::from_slides(&carousel.slides),
            ImageBatch {
                generated: 1,
                fallbacks: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn regenerate_replaces_image_and_clears_custom() {
        let images = Arc::new(ScriptedImages::new(vec![Ok("https://img.test/new.png".into())]));
        let g = generator(Arc::new(ScriptedText::new(vec![])), images.clone());
        let mut carousel = CarouselData::new("Ana", "ana");
        carousel.slides = vec![Slide::new(4, "text")];
        carousel.slides[0].custom_image_url = Some("mine.png".into());

        let image = g
            .regenerate_slide_image(&mut carousel, 4, Some("a blue door"))
            .await
            .unwrap();
        assert!(!image.fallback_used);
        let slide = carousel.slide(4).unwrap();
        assert_eq!(slide.primary_image(), Some("https://img.test/new.png"));
        assert_eq!(slide.image_prompt.as_deref(), Some("a blue door"));
        assert_eq!(images.prompts(), vec!["a blue door"]);
    }

    #[tokio::test(start_paused = true)]
    async fn regenerate_unknown_slide_is_an_error() {
        let g = generator(
            Arc::new(ScriptedText::new(vec![])),
            Arc::new(ScriptedImages::new(vec![])),
        );
        let mut carousel = CarouselData::new("Ana", "ana");
        let err = g
            .regenerate_slide_image(&mut carousel, 9, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Session(SessionError::SlideNotFound(9))));
    }
}
