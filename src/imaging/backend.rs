//! Drawing surface trait and the scene elements it understands.
//!
//! A [`Surface`] receives a flat list of [`Element`]s in paint order and
//! exports the result as PNG bytes. Two production surfaces exist:
//!
//! | Surface | Pipeline |
//! |---|---|
//! | [`VectorSurface`](super::vector_backend::VectorSurface) | elements → SVG → `usvg` → `resvg` pixmap → PNG |
//! | [`RasterSurface`](super::raster_backend::RasterSurface) | elements painted straight onto a `tiny_skia` pixmap → PNG |
//!
//! Both must accept every element variant, so the capture engine can switch
//! between them without touching the scene.

use super::params::Color;
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("scene could not be built: {0}")]
    Scene(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// How an image element is clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clip {
    None,
    /// Clip to the largest circle inscribed in the element box.
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
}

/// One paintable primitive. Coordinates are canvas pixels (before the
/// pixel ratio is applied).
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: Color,
        corner_radius: f32,
    },
    Circle {
        cx: f32,
        cy: f32,
        r: f32,
        fill: Color,
    },
    /// Two-stop diagonal gradient (top-left to bottom-right) in a circle.
    GradientCircle {
        cx: f32,
        cy: f32,
        r: f32,
        from: Color,
        to: Color,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pixels: Arc<RgbaImage>,
        clip: Clip,
    },
    /// Single line of text. `y` is the baseline.
    Text {
        x: f32,
        y: f32,
        content: String,
        font_size: f32,
        weight: FontWeight,
        fill: Color,
        anchor: TextAnchor,
    },
    /// Verification badge: filled circle with a check mark.
    Badge {
        cx: f32,
        cy: f32,
        r: f32,
        fill: Color,
    },
}

/// Something that can paint elements and export PNG bytes.
pub trait Surface {
    /// Paint `elements` in order on top of whatever is already drawn.
    fn draw(&mut self, elements: &[Element]) -> Result<(), SurfaceError>;

    /// Encode the current contents as PNG.
    fn export(&mut self) -> Result<Vec<u8>, SurfaceError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Test surface that records what it was asked to draw and exports a
    /// canned byte buffer.
    pub struct RecordingSurface {
        pub drawn: Vec<Element>,
        pub output: Vec<u8>,
        pub fail_draw: bool,
    }

    impl RecordingSurface {
        pub fn new(output: Vec<u8>) -> Self {
            Self {
                drawn: Vec::new(),
                output,
                fail_draw: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_draw: true,
                ..Self::new(Vec::new())
            }
        }
    }

    impl Surface for RecordingSurface {
        fn draw(&mut self, elements: &[Element]) -> Result<(), SurfaceError> {
            if self.fail_draw {
                return Err(SurfaceError::Render("recording surface told to fail".into()));
            }
            self.drawn.extend_from_slice(elements);
            Ok(())
        }

        fn export(&mut self) -> Result<Vec<u8>, SurfaceError> {
            Ok(self.output.clone())
        }
    }

    #[test]
    fn recording_surface_keeps_paint_order() {
        let mut surface = RecordingSurface::new(vec![1, 2, 3]);
        surface
            .draw(&[
                Element::Circle {
                    cx: 1.0,
                    cy: 1.0,
                    r: 1.0,
                    fill: Color::BLACK,
                },
                Element::Badge {
                    cx: 2.0,
                    cy: 2.0,
                    r: 1.0,
                    fill: Color::WHITE,
                },
            ])
            .unwrap();
        assert!(matches!(surface.drawn[0], Element::Circle { .. }));
        assert!(matches!(surface.drawn[1], Element::Badge { .. }));
        assert_eq!(surface.export().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failing_surface_errors_on_draw() {
        let mut surface = RecordingSurface::failing();
        assert!(surface.draw(&[]).is_err());
    }
}
