//! Lay out one slide as a social-media post.
//!
//! The compositor turns [`SlideParams`] into a [`Scene`]: a canvas size, a
//! background and a flat list of [`Element`]s in paint order. It does no
//! network work; image references must already be acquired (normally data
//! URLs). Decoding those references is the only slow step and is bounded by
//! a timeout.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  (avatar)  Display Name (✓)          │
//! │            @handle                   │
//! │                                      │
//! │  Body text, word-wrapped to the      │
//! │  canvas width.                       │
//! │                                      │
//! │  ┌────────────────────────────────┐  │
//! │  │   content image, aspect-fit    │  │
//! │  └────────────────────────────────┘  │
//! └──────────────────────────────────────┘
//! ```
//!
//! All distances are given for a 1080px-wide canvas and scaled with the
//! configured width.
//!
//! Nothing is drawn past the bottom padding. When a content image is present
//! the body keeps at least `MIN_IMAGE_HEIGHT` free below it: the font shrinks
//! in 10% steps down to `MIN_BODY_FONT`, and text that still does not fit is
//! cut with an ellipsis.

use crate::config::CanvasConfig;
use crate::imaging::embed::{decode_data_url, decode_rgba};
use crate::imaging::placeholder::{avatar_colors, initials};
use crate::imaging::{
    CaptureOptions, Clip, Color, Element, FontWeight, Size, TextAnchor, content_placeholder,
    estimate_text_width, fit_within, font_size_for_text, line_height, max_chars_per_line,
    wrap_text,
};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const REFERENCE_WIDTH: f32 = 1080.0;
const PADDING: f32 = 80.0;
const AVATAR: f32 = 120.0;
const NAME_FONT: f32 = 40.0;
const HANDLE_FONT: f32 = 32.0;
const BADGE_RADIUS: f32 = 16.0;
const HEADER_GAP: f32 = 48.0;
const IMAGE_GAP: f32 = 40.0;
/// Vertical room the body always leaves for a content image.
const MIN_IMAGE_HEIGHT: f32 = 100.0;
/// Smallest body font the shrink loop goes down to.
const MIN_BODY_FONT: f32 = 24.0;
const ELLIPSIS: char = '…';

/// Paintable description of a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub size: Size,
    pub background: Color,
    pub elements: Vec<Element>,
}

impl Scene {
    pub fn capture_options(&self, pixel_ratio: f32) -> CaptureOptions {
        CaptureOptions::new(self.size, self.background, pixel_ratio)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlideParams {
    pub username: String,
    pub handle: String,
    pub is_verified: bool,
    pub text: String,
    pub profile_image: Option<String>,
    pub content_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedSlide {
    pub scene: Scene,
    /// A referenced image could not be decoded and a placeholder was drawn
    /// in its place.
    pub fallback_used: bool,
    /// The body did not fit even at the smallest font and was cut.
    pub text_truncated: bool,
    /// A content image was given but the header left no room for it.
    pub image_dropped: bool,
}

/// Body lines with the y of each line's bottom edge.
#[derive(Debug, Clone, PartialEq)]
struct BodyLayout {
    font: f32,
    lines: Vec<(f32, String)>,
    /// Bottom of the last line.
    end: f32,
}

impl BodyLayout {
    fn new(text: &str, font: f32, width: u32, top: f32) -> Self {
        let lh = line_height(font);
        let mut cursor = top;
        let mut end = top;
        let mut lines = Vec::new();
        for line in wrap_text(text, max_chars_per_line(font, width)) {
            cursor += lh;
            end = cursor;
            lines.push((cursor, line.text));
            if line.paragraph_end {
                cursor += lh * 0.4;
            }
        }
        Self { font, lines, end }
    }

    /// Drop lines ending below `limit` and mark the cut with an ellipsis.
    /// Returns how many lines were dropped.
    fn truncate(&mut self, limit: f32, top: f32) -> usize {
        let keep = self.lines.iter().take_while(|(bottom, _)| *bottom <= limit).count();
        let dropped = self.lines.len() - keep;
        if dropped == 0 {
            return 0;
        }
        self.lines.truncate(keep);
        self.end = self.lines.last().map_or(top, |(bottom, _)| *bottom);
        if let Some((_, text)) = self.lines.last_mut() {
            text.pop();
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
            text.push(ELLIPSIS);
        }
        dropped
    }
}

#[derive(Debug, Clone)]
pub struct Compositor {
    size: Size,
    background: Color,
    text: Color,
    muted: Color,
    accent: Color,
    decode_timeout: Duration,
}

/// `handle` with exactly one leading `@`.
pub fn display_handle(handle: &str) -> String {
    format!("@{}", handle.trim().trim_start_matches('@'))
}

impl Compositor {
    pub fn from_config(canvas: &CanvasConfig) -> Self {
        let color = |hex: &str, default: Color| Color::parse_hex(hex).unwrap_or(default);
        Self {
            size: canvas.size(),
            background: color(&canvas.background, Color::WHITE),
            text: color(&canvas.text_color, Color::rgb(0x0f, 0x14, 0x19)),
            muted: color(&canvas.muted_color, Color::rgb(0x53, 0x64, 0x71)),
            accent: color(&canvas.accent_color, Color::rgb(0x1d, 0x9b, 0xf0)),
            decode_timeout: canvas.image_load_timeout(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub async fn compose(&self, params: &SlideParams) -> ComposedSlide {
        let unit = self.size.width as f32 / REFERENCE_WIDTH;
        let width = self.size.width as f32;
        let height = self.size.height as f32;
        let pad = PADDING * unit;
        let mut elements = Vec::new();
        let mut fallback_used = false;

        // Avatar
        let avatar = AVATAR * unit;
        match &params.profile_image {
            Some(reference) => match self.decode(reference).await {
                Ok(pixels) => elements.push(Element::Image {
                    x: pad,
                    y: pad,
                    width: avatar,
                    height: avatar,
                    pixels: Arc::new(pixels),
                    clip: Clip::Circle,
                }),
                Err(reason) => {
                    warn!(%reason, "profile image unusable, drawing initials");
                    fallback_used = true;
                    elements.extend(initials_avatar(&params.username, pad, pad, avatar));
                }
            },
            None => elements.extend(initials_avatar(&params.username, pad, pad, avatar)),
        }

        // Name, badge, handle
        let name_x = pad + avatar + 24.0 * unit;
        let name_font = NAME_FONT * unit;
        let name = params.username.trim();
        elements.push(Element::Text {
            x: name_x,
            y: pad + 50.0 * unit,
            content: name.to_string(),
            font_size: name_font,
            weight: FontWeight::Bold,
            fill: self.text,
            anchor: TextAnchor::Start,
        });
        if params.is_verified {
            let r = BADGE_RADIUS * unit;
            elements.push(Element::Badge {
                cx: name_x + estimate_text_width(name, name_font) + 12.0 * unit + r,
                cy: pad + 50.0 * unit - name_font * 0.35,
                r,
                fill: self.accent,
            });
        }
        elements.push(Element::Text {
            x: name_x,
            y: pad + 100.0 * unit,
            content: display_handle(&params.handle),
            font_size: HANDLE_FONT * unit,
            weight: FontWeight::Regular,
            fill: self.muted,
            anchor: TextAnchor::Start,
        });

        // Body
        let text_width = (width - 2.0 * pad).max(1.0) as u32;
        let body_top = pad + avatar + HEADER_GAP * unit;
        let bottom = height - pad;
        let limit = if params.content_image.is_some() {
            bottom - (IMAGE_GAP + MIN_IMAGE_HEIGHT) * unit
        } else {
            bottom
        };
        let min_font = MIN_BODY_FONT * unit;
        let mut body = BodyLayout::new(
            &params.text,
            font_size_for_text(&params.text) * unit,
            text_width,
            body_top,
        );
        while body.end > limit && body.font > min_font {
            let smaller = (body.font * 0.9).max(min_font);
            body = BodyLayout::new(&params.text, smaller, text_width, body_top);
        }
        let dropped = body.truncate(limit, body_top);
        if dropped > 0 {
            warn!(dropped, font = body.font, "body text does not fit the slide, cutting it");
        }
        let font = body.font;
        let lh = line_height(font);
        for (line_bottom, text) in &body.lines {
            if !text.is_empty() {
                elements.push(Element::Text {
                    x: pad,
                    y: line_bottom - (lh - font) / 2.0,
                    content: text.clone(),
                    font_size: font,
                    weight: FontWeight::Regular,
                    fill: self.text,
                    anchor: TextAnchor::Start,
                });
            }
        }

        // Content image
        let mut image_dropped = false;
        if let Some(reference) = &params.content_image {
            let top = body.end + IMAGE_GAP * unit;
            let room = bottom - top;
            if room >= MIN_IMAGE_HEIGHT * unit {
                let bounds = Size::new(text_width, room as u32);
                let pixels = match self.decode(reference).await {
                    Ok(pixels) => Some(pixels),
                    Err(reason) => {
                        warn!(%reason, "content image unusable, drawing placeholder");
                        fallback_used = true;
                        decode_rgba(&content_placeholder(bounds).png).ok()
                    }
                };
                if let Some(pixels) = pixels
                    && let Some(fit) = fit_within(Size::new(pixels.width(), pixels.height()), bounds)
                {
                    elements.push(Element::Image {
                        x: pad + (text_width - fit.width) as f32 / 2.0,
                        y: top,
                        width: fit.width as f32,
                        height: fit.height as f32,
                        pixels: Arc::new(pixels),
                        clip: Clip::None,
                    });
                }
            } else {
                warn!(room, "canvas too short for a content image, leaving it out");
                image_dropped = true;
            }
        }

        ComposedSlide {
            scene: Scene {
                size: self.size,
                background: self.background,
                elements,
            },
            fallback_used,
            text_truncated: dropped > 0,
            image_dropped,
        }
    }

    /// Decode an embedded reference off the async runtime, within the
    /// configured time budget.
    async fn decode(&self, reference: &str) -> Result<RgbaImage, String> {
        let owned = reference.to_string();
        let task = tokio::task::spawn_blocking(move || decode_data_url(&owned));
        match tokio::time::timeout(self.decode_timeout, task).await {
            Err(_) => Err(format!("decode timed out after {:?}", self.decode_timeout)),
            Ok(Err(join)) => Err(join.to_string()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(pixels))) => Ok(pixels),
        }
    }
}

/// Gradient disc with initials, drawn straight into the scene.
fn initials_avatar(name: &str, x: f32, y: f32, size: f32) -> [Element; 2] {
    let (from, to) = avatar_colors(name);
    let letters = initials(name);
    let r = size / 2.0;
    let font_size = if letters.chars().count() > 1 { size * 0.38 } else { size * 0.45 };
    [
        Element::GradientCircle {
            cx: x + r,
            cy: y + r,
            r,
            from,
            to,
        },
        Element::Text {
            x: x + r,
            y: y + r + font_size * 0.35,
            content: letters,
            font_size,
            weight: FontWeight::Bold,
            fill: Color::WHITE,
            anchor: TextAnchor::Middle,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::embed::to_data_url;
    use crate::test_helpers::{sample_png, small_canvas};

    fn params() -> SlideParams {
        SlideParams {
            username: "Ana Lima".into(),
            handle: "analima".into(),
            is_verified: false,
            text: "Small steps compound.".into(),
            profile_image: None,
            content_image: None,
        }
    }

    fn texts(scene: &Scene) -> Vec<&str> {
        scene
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    fn images(scene: &Scene) -> Vec<(f32, f32, f32, f32)> {
        scene
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Image {
                    x,
                    y,
                    width,
                    height,
                    ..
                } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .collect()
    }

    fn compositor() -> Compositor {
        Compositor::from_config(&CanvasConfig::default())
    }

    // =========================================================================
    // Header
    // =========================================================================

    #[tokio::test]
    async fn header_has_name_and_handle() {
        let slide = compositor().compose(&params()).await;
        let t = texts(&slide.scene);
        assert!(t.contains(&"Ana Lima"));
        assert!(t.contains(&"@analima"));
        assert_eq!(slide.scene.size, Size::new(1080, 1350));
        assert!(!slide.fallback_used);
    }

    #[test]
    fn handle_gets_single_at_sign() {
        assert_eq!(display_handle("analima"), "@analima");
        assert_eq!(display_handle("@@analima "), "@analima");
    }

    #[tokio::test]
    async fn badge_follows_name_only_when_verified() {
        let plain = compositor().compose(&params()).await;
        assert!(!plain.scene.elements.iter().any(|e| matches!(e, Element::Badge { .. })));

        let verified = compositor()
            .compose(&SlideParams {
                is_verified: true,
                ..params()
            })
            .await;
        let badge_x = verified
            .scene
            .elements
            .iter()
            .find_map(|e| match e {
                Element::Badge { cx, .. } => Some(*cx),
                _ => None,
            })
            .unwrap();
        let name_end = 80.0 + 120.0 + 24.0 + estimate_text_width("Ana Lima", 40.0);
        assert!(badge_x > name_end);
    }

    #[tokio::test]
    async fn missing_profile_draws_initials() {
        let slide = compositor().compose(&params()).await;
        assert!(matches!(slide.scene.elements[0], Element::GradientCircle { .. }));
        assert!(texts(&slide.scene).contains(&"AL"));
        assert!(!slide.fallback_used);
    }

    #[tokio::test]
    async fn profile_image_is_circle_clipped() {
        let slide = compositor()
            .compose(&SlideParams {
                profile_image: Some(to_data_url("image/png", &sample_png(16, 16))),
                ..params()
            })
            .await;
        assert!(matches!(
            slide.scene.elements[0],
            Element::Image {
                clip: Clip::Circle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn broken_profile_falls_back_to_initials() {
        let slide = compositor()
            .compose(&SlideParams {
                profile_image: Some("data:image/png;base64,AAAA".into()),
                ..params()
            })
            .await;
        assert!(slide.fallback_used);
        assert!(matches!(slide.scene.elements[0], Element::GradientCircle { .. }));
    }

    // =========================================================================
    // Body
    // =========================================================================

    #[tokio::test]
    async fn long_text_is_wrapped_and_smaller() {
        let text = "word ".repeat(50);
        let slide = compositor()
            .compose(&SlideParams {
                text: text.clone(),
                ..params()
            })
            .await;
        let body: Vec<(f32, &str)> = slide
            .scene
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Text {
                    font_size,
                    content,
                    weight: FontWeight::Regular,
                    ..
                } if !content.starts_with('@') => Some((*font_size, content.as_str())),
                _ => None,
            })
            .collect();
        assert!(body.len() > 1);
        assert!(body.iter().all(|(size, _)| *size == 36.0));
        let rejoined: Vec<&str> = body.iter().map(|(_, t)| *t).collect();
        assert_eq!(rejoined.join(" "), text.trim());
    }

    #[tokio::test]
    async fn layout_scales_with_canvas_width() {
        let slide = Compositor::from_config(&small_canvas()).compose(&params()).await;
        match &slide.scene.elements[0] {
            Element::GradientCircle { r, .. } => assert_eq!(*r, 15.0),
            other => panic!("unexpected first element {other:?}"),
        }
    }

    // =========================================================================
    // Content image
    // =========================================================================

    #[tokio::test]
    async fn content_image_fits_below_text() {
        let slide = compositor()
            .compose(&SlideParams {
                content_image: Some(to_data_url("image/png", &sample_png(200, 100))),
                ..params()
            })
            .await;
        let imgs = images(&slide.scene);
        assert_eq!(imgs.len(), 1);
        let (x, y, w, h) = imgs[0];
        assert_eq!(w, 920.0);
        assert_eq!(h, 460.0);
        assert_eq!(x, 80.0);
        assert!(y + h <= 1350.0 - 80.0);
        assert!(!slide.fallback_used);
    }

    #[tokio::test]
    async fn undecodable_content_image_uses_placeholder() {
        let slide = compositor()
            .compose(&SlideParams {
                content_image: Some("https://cdn.test/not-embedded.png".into()),
                ..params()
            })
            .await;
        assert!(slide.fallback_used);
        assert_eq!(images(&slide.scene).len(), 1);
    }

    fn body_lines(scene: &Scene) -> Vec<(f32, f32, &str)> {
        scene
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Text {
                    y,
                    font_size,
                    content,
                    weight: FontWeight::Regular,
                    ..
                } if !content.starts_with('@') => Some((*y, *font_size, content.as_str())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn long_text_shrinks_to_keep_the_image() {
        let text = "habit ".repeat(166);
        let slide = compositor()
            .compose(&SlideParams {
                text: text.clone(),
                content_image: Some(to_data_url("image/png", &sample_png(10, 10))),
                ..params()
            })
            .await;

        let imgs = images(&slide.scene);
        assert_eq!(imgs.len(), 1);
        let (_, top, _, h) = imgs[0];
        assert!(h >= MIN_IMAGE_HEIGHT);
        assert!(top + h <= 1350.0 - 80.0);

        let body = body_lines(&slide.scene);
        assert!(body.iter().all(|(y, _, _)| *y < top));
        let font = body[0].1;
        assert!(font < 32.0 && font >= MIN_BODY_FONT, "font {font}");
        let rejoined: Vec<&str> = body.iter().map(|(_, _, t)| *t).collect();
        assert_eq!(rejoined.join(" "), text.trim());
        assert!(!slide.text_truncated);
        assert!(!slide.image_dropped);
    }

    #[tokio::test]
    async fn text_too_long_even_at_smallest_font_is_cut() {
        let slide = compositor()
            .compose(&SlideParams {
                text: "x ".repeat(1000),
                content_image: Some(to_data_url("image/png", &sample_png(10, 10))),
                ..params()
            })
            .await;

        assert!(slide.text_truncated);
        let imgs = images(&slide.scene);
        assert_eq!(imgs.len(), 1);
        let (_, top, _, h) = imgs[0];
        assert!(top + h <= 1350.0 - 80.0);

        let body = body_lines(&slide.scene);
        assert!(body.iter().all(|(y, size, _)| *y < top && *size == MIN_BODY_FONT));
        assert!(body.last().unwrap().2.ends_with(ELLIPSIS));
        assert!(!slide.fallback_used);
    }

    #[tokio::test]
    async fn body_without_image_stays_above_bottom_padding() {
        let slide = compositor()
            .compose(&SlideParams {
                text: "x ".repeat(2000),
                ..params()
            })
            .await;
        assert!(slide.text_truncated);
        assert!(body_lines(&slide.scene).iter().all(|(y, _, _)| *y <= 1350.0 - 80.0));
    }

    #[tokio::test]
    async fn short_canvas_drops_image_and_says_so() {
        let canvas = CanvasConfig {
            width: 1080,
            height: 300,
            ..CanvasConfig::default()
        };
        let slide = Compositor::from_config(&canvas)
            .compose(&SlideParams {
                content_image: Some(to_data_url("image/png", &sample_png(10, 10))),
                ..params()
            })
            .await;
        assert!(slide.image_dropped);
        assert!(images(&slide.scene).is_empty());
    }
}
