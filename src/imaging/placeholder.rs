//! Synthetic placeholder images.
//!
//! Used whenever a real image cannot be obtained. Both generators are pure:
//! no network, no clock, no randomness. The same input always produces the
//! same PNG bytes.
//!
//! - [`profile_avatar`]: gradient disc with up to two initials. The hue pair
//!   comes from a SHA-256 of the trimmed display name, so a given person
//!   always gets the same colors.
//! - [`content_placeholder`]: neutral striped panel with a picture glyph and
//!   the caption "Image unavailable".

use super::backend::{Element, FontWeight, Surface, TextAnchor};
use super::embed::EmbeddedImage;
use super::params::{CaptureOptions, Color, Size};
use super::png::encode_rgba;
use super::raster_backend::RasterSurface;
use super::vector_backend::VectorSurface;
use sha2::{Digest, Sha256};

pub const DEFAULT_INITIAL: &str = "U";
pub const UNAVAILABLE_CAPTION: &str = "Image unavailable";
/// Largest edge either generator will produce.
pub const MAX_EDGE: u32 = 4096;

const PANEL: Color = Color::rgb(0xf3, 0xf4, 0xf6);
const STRIPE: Color = Color::rgb(0xe5, 0xe7, 0xeb);
const GLYPH_FRAME: Color = Color::rgb(0xd1, 0xd5, 0xdb);
const GLYPH_FILL: Color = Color::rgb(0xf9, 0xfa, 0xfb);
const CAPTION: Color = Color::rgb(0x6b, 0x72, 0x80);

/// Up to two uppercase initials: the first alphanumeric character of each of
/// the first two words. Empty or whitespace-only names yield `"U"`.
pub fn initials(name: &str) -> String {
    let out: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    if out.is_empty() {
        DEFAULT_INITIAL.to_string()
    } else {
        out
    }
}

/// Convert HSL (hue in degrees, saturation and lightness in 0–1) to RGB.
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Color {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color::rgb(to_u8(r), to_u8(g), to_u8(b))
}

/// Gradient endpoints for a display name.
pub fn avatar_colors(name: &str) -> (Color, Color) {
    let digest = Sha256::digest(name.trim().as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    let offset = 30 + (digest[2] % 60) as u16;
    let second = (hue + offset) % 360;
    (
        hsl_to_rgb(hue as f32, 0.65, 0.55),
        hsl_to_rgb(second as f32, 0.70, 0.42),
    )
}

/// Circular avatar with the name's initials on a deterministic gradient.
pub fn profile_avatar(name: &str, size: u32) -> EmbeddedImage {
    let size = size.clamp(1, MAX_EDGE);
    let s = size as f32;
    let (from, to) = avatar_colors(name);
    let letters = initials(name);
    let font_size = if letters.chars().count() > 1 { s * 0.38 } else { s * 0.45 };

    let elements = [
        Element::GradientCircle {
            cx: s / 2.0,
            cy: s / 2.0,
            r: s / 2.0,
            from,
            to,
        },
        Element::Text {
            x: s / 2.0,
            y: s / 2.0 + font_size * 0.35,
            content: letters,
            font_size,
            weight: FontWeight::Bold,
            fill: Color::WHITE,
            anchor: TextAnchor::Middle,
        },
    ];
    render(&elements, Size::new(size, size), Color::WHITE.with_alpha(0), from)
}

/// Neutral panel shown in place of a content image.
pub fn content_placeholder(size: Size) -> EmbeddedImage {
    let size = Size::new(size.width.clamp(1, MAX_EDGE), size.height.clamp(1, MAX_EDGE));
    let (w, h) = (size.width as f32, size.height as f32);
    let short = w.min(h);
    let mut elements = Vec::new();

    // Diagonal stripes as staggered tiles.
    let cell = (short / 30.0).max(4.0);
    let cols = (w / cell).ceil() as u32;
    let rows = (h / cell).ceil() as u32;
    for row in 0..rows {
        for col in 0..cols {
            if (col + row) % 4 == 0 {
                elements.push(Element::Rect {
                    x: col as f32 * cell,
                    y: row as f32 * cell,
                    width: cell,
                    height: cell,
                    fill: STRIPE,
                    corner_radius: 0.0,
                });
            }
        }
    }

    // Picture glyph: framed card with a sun and two hills.
    let gw = short * 0.28;
    let gh = gw * 0.75;
    let gx = (w - gw) / 2.0;
    let gy = (h - gh) / 2.0 - short * 0.05;
    let frame = gw * 0.06;
    elements.extend([
        Element::Rect {
            x: gx,
            y: gy,
            width: gw,
            height: gh,
            fill: GLYPH_FRAME,
            corner_radius: gw * 0.08,
        },
        Element::Rect {
            x: gx + frame,
            y: gy + frame,
            width: gw - 2.0 * frame,
            height: gh - 2.0 * frame,
            fill: GLYPH_FILL,
            corner_radius: gw * 0.05,
        },
        Element::Circle {
            cx: gx + gw * 0.3,
            cy: gy + gh * 0.32,
            r: gw * 0.08,
            fill: GLYPH_FRAME,
        },
        Element::Rect {
            x: gx + gw * 0.18,
            y: gy + gh * 0.55,
            width: gw * 0.3,
            height: gh * 0.45 - frame,
            fill: GLYPH_FRAME,
            corner_radius: gw * 0.03,
        },
        Element::Rect {
            x: gx + gw * 0.45,
            y: gy + gh * 0.4,
            width: gw * 0.4,
            height: gh * 0.6 - frame,
            fill: GLYPH_FRAME,
            corner_radius: gw * 0.03,
        },
        Element::Text {
            x: w / 2.0,
            y: gy + gh + short * 0.1,
            content: UNAVAILABLE_CAPTION.to_string(),
            font_size: (short * 0.05).max(8.0),
            weight: FontWeight::Regular,
            fill: CAPTION,
            anchor: TextAnchor::Middle,
        },
    ]);

    render(&elements, size, PANEL, PANEL)
}

/// Paint on the vector surface, then the raster surface, then fall back to a
/// flat fill of `solid`.
fn render(elements: &[Element], size: Size, background: Color, solid: Color) -> EmbeddedImage {
    let options = CaptureOptions::new(size, background, 1.0);
    let attempts: [(&str, Box<dyn Surface>); 2] = [
        ("vector", Box::new(VectorSurface::new(&options))),
        ("raster", Box::new(RasterSurface::new(&options))),
    ];
    for (name, mut surface) in attempts {
        match surface.draw(elements).and_then(|_| surface.export()) {
            Ok(png) => {
                return EmbeddedImage {
                    png,
                    width: size.width,
                    height: size.height,
                };
            }
            Err(e) => tracing::warn!(surface = name, error = %e, "placeholder render failed"),
        }
    }

    let rgba: Vec<u8> = std::iter::repeat_n(solid.to_rgba().0, size.width as usize * size.height as usize)
        .flatten()
        .collect();
    EmbeddedImage {
        png: encode_rgba(size.width, size.height, &rgba)
            .expect("a correctly sized RGBA buffer always encodes"),
        width: size.width,
        height: size.height,
    }
}
