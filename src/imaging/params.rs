//! Parameter types for drawing and capture.
//!
//! These structs describe *what* to produce, not *how*. They sit between the
//! compositor (which decides what goes on a slide) and the surfaces (which do
//! the pixel work), so a test surface can be swapped in without touching
//! layout logic.
//!
//! ## Types
//!
//! - [`Size`]: Pixel dimensions.
//! - [`Color`]: RGBA color parsed from `#rgb`, `#rrggbb` or `#rrggbbaa`.
//! - [`CaptureOptions`]: Canvas size, background and pixel ratio for one export.

use std::fmt;

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Multiply both edges by `ratio`, never dropping below one pixel.
    pub fn scaled(self, ratio: f32) -> Self {
        let scale = |v: u32| ((v as f32 * ratio).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                let nib = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
                Some(Color::rgb(nib(0)?, nib(1)?, nib(2)?))
            }
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Color {
                a: byte(6)?,
                ..Color::rgb(byte(0)?, byte(2)?, byte(4)?)
            }),
            _ => None,
        }
    }

    /// `#rrggbb` for opaque colors, `#rrggbbaa` otherwise.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    /// Opacity as 0.0–1.0, for SVG `fill-opacity`.
    pub fn opacity(self) -> f32 {
        self.a as f32 / 255.0
    }
}

/// Everything a surface needs to export one slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub pixel_ratio: f32,
}

impl CaptureOptions {
    pub fn new(size: Size, background: Color, pixel_ratio: f32) -> Self {
        Self {
            width: size.width,
            height: size.height,
            background,
            pixel_ratio,
        }
    }

    pub fn canvas_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Exported pixel dimensions after applying the pixel ratio.
    pub fn output_size(&self) -> Size {
        self.canvas_size().scaled(self.pixel_ratio)
    }

    /// Same canvas at pixel ratio 1, used when reconstructing a bad capture.
    pub fn at_unit_scale(&self) -> Self {
        Self {
            pixel_ratio: 1.0,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_six_digit_hex() {
        assert_eq!(Color::parse_hex("#1d9bf0"), Some(Color::rgb(0x1d, 0x9b, 0xf0)));
        assert_eq!(Color::parse_hex("ffffff"), Some(Color::WHITE));
    }

    #[test]
    fn parse_short_and_alpha_hex() {
        assert_eq!(Color::parse_hex("#fff"), Some(Color::WHITE));
        assert_eq!(
            Color::parse_hex("#00000080"),
            Some(Color::BLACK.with_alpha(0x80))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Color::parse_hex("blue"), None);
        assert_eq!(Color::parse_hex("#12345"), None);
        assert_eq!(Color::parse_hex("#gggggg"), None);
        assert_eq!(Color::parse_hex(""), None);
    }

    #[test]
    fn to_hex_roundtrips() {
        for s in ["#0f1419", "#53647180"] {
            assert_eq!(Color::parse_hex(s).unwrap().to_hex(), s);
        }
    }

    #[test]
    fn output_size_applies_pixel_ratio() {
        let opts = CaptureOptions::new(Size::new(1080, 1350), Color::WHITE, 2.0);
        assert_eq!(opts.output_size(), Size::new(2160, 2700));
        assert_eq!(opts.at_unit_scale().output_size(), Size::new(1080, 1350));
    }

    #[test]
    fn scaled_never_reaches_zero() {
        assert_eq!(Size::new(1, 1).scaled(0.1), Size::new(1, 1));
    }
}
