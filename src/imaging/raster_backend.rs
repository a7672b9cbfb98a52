//! Direct raster surface painted with `tiny_skia`.
//!
//! Shapes and images go straight onto a pixmap as anti-aliased paths, with
//! no SVG document in between: images are drawn with a transform instead of
//! being re-encoded as data URLs, and circular clips are masks. Text is shaped
//! against the same system font database the vector surface uses and its
//! glyph outlines are filled onto the pixmap. This is the surface used when
//! the vector pipeline fails and for reconstructing invalid captures.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Canvas | `tiny_skia::Pixmap` |
//! | Shapes | `PathBuilder` + `Pixmap::fill_path` / `stroke_path` |
//! | Circular clip | `tiny_skia::Mask` |
//! | Image scaling | `Pixmap::draw_pixmap` with a bicubic `PixmapPaint` |
//! | Glyphs | `usvg` text shaping + `resvg::render` |
//! | PNG encode | `image::codecs::png::PngEncoder` |

use super::backend::{Clip, Element, Surface, SurfaceError};
use super::params::{CaptureOptions, Color};
use super::svg::{encode_pixmap, text_tree};
use image::RgbaImage;
use resvg::tiny_skia::{
    self, FillRule, FilterQuality, GradientStop, IntSize, LineCap, LineJoin, LinearGradient, Mask,
    Paint, Path, PathBuilder, Pixmap, PixmapPaint, Point, SpreadMode, Stroke, Transform,
};

/// Control-point distance for a quarter circle drawn as one cubic.
const KAPPA: f32 = 0.552_284_8;

pub struct RasterSurface {
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
    transform: Transform,
}

impl RasterSurface {
    pub fn new(options: &CaptureOptions) -> Self {
        let out = options.output_size();
        let pixmap = Pixmap::new(out.width, out.height).map(|mut p| {
            p.fill(sk_color(options.background));
            p
        });
        let scale = out.width as f32 / options.width.max(1) as f32;
        Self {
            pixmap,
            width: options.width,
            height: options.height,
            transform: Transform::from_scale(scale, scale),
        }
    }

    fn canvas(&mut self) -> Result<&mut Pixmap, SurfaceError> {
        self.pixmap
            .as_mut()
            .ok_or_else(|| SurfaceError::Render("raster canvas could not be allocated".to_string()))
    }

    fn fill(&mut self, path: Option<Path>, paint: &Paint) -> Result<(), SurfaceError> {
        let transform = self.transform;
        if let Some(path) = path {
            self.canvas()?
                .fill_path(&path, paint, FillRule::Winding, transform, None);
        }
        Ok(())
    }

    fn image(
        &mut self,
        frame: (f32, f32, f32, f32),
        pixels: &RgbaImage,
        clip: Clip,
    ) -> Result<(), SurfaceError> {
        let (x, y, w, h) = frame;
        let source = premultiplied(pixels)?;
        let placement = Transform::from_row(
            w / source.width() as f32,
            0.0,
            0.0,
            h / source.height() as f32,
            x,
            y,
        )
        .post_concat(self.transform);

        let transform = self.transform;
        let canvas = self.canvas()?;
        let mask = match clip {
            Clip::None => None,
            Clip::Circle => {
                let mut mask = Mask::new(canvas.width(), canvas.height())
                    .ok_or_else(|| SurfaceError::Render("clip mask could not be allocated".into()))?;
                if let Some(circle) = PathBuilder::from_circle(x + w / 2.0, y + h / 2.0, w.min(h) / 2.0) {
                    mask.fill_path(&circle, FillRule::Winding, true, transform);
                }
                Some(mask)
            }
        };
        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        canvas.draw_pixmap(0, 0, source.as_ref(), &paint, placement, mask.as_ref());
        Ok(())
    }

    fn text(&mut self, element: &Element) -> Result<(), SurfaceError> {
        let tree = text_tree(element, self.width, self.height)?;
        let transform = self.transform;
        resvg::render(&tree, transform, &mut self.canvas()?.as_mut());
        Ok(())
    }

    fn badge(&mut self, cx: f32, cy: f32, r: f32, fill: Color) -> Result<(), SurfaceError> {
        self.fill(PathBuilder::from_circle(cx, cy, r), &solid(fill))?;

        let mut check = PathBuilder::new();
        check.move_to(cx - r * 0.45, cy + r * 0.02);
        check.line_to(cx - r * 0.12, cy + r * 0.35);
        check.line_to(cx + r * 0.48, cy - r * 0.32);
        let stroke = Stroke {
            width: r * 0.22,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let transform = self.transform;
        if let Some(path) = check.finish() {
            self.canvas()?
                .stroke_path(&path, &solid(Color::WHITE), &stroke, transform, None);
        }
        Ok(())
    }
}

fn sk_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(sk_color(color));
    paint.anti_alias = true;
    paint
}

/// Rectangle with corners rounded by `radius`, clamped to half the shorter
/// edge. A zero radius gives a plain rectangle.
fn rounded_rect(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    let r = radius.clamp(0.0, w.min(h) / 2.0);
    if r == 0.0 {
        return tiny_skia::Rect::from_xywh(x, y, w, h).map(PathBuilder::from_rect);
    }
    let k = r * KAPPA;
    let (right, bottom) = (x + w, y + h);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Copy an RGBA image into a premultiplied pixmap.
fn premultiplied(pixels: &RgbaImage) -> Result<Pixmap, SurfaceError> {
    let data: Vec<u8> = pixels
        .pixels()
        .flat_map(|p| {
            let [r, g, b, a] = p.0;
            let c = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    IntSize::from_wh(pixels.width(), pixels.height())
        .and_then(|size| Pixmap::from_vec(data, size))
        .ok_or_else(|| {
            SurfaceError::Scene(format!(
                "image of {}x{} cannot be drawn",
                pixels.width(),
                pixels.height()
            ))
        })
}

impl Surface for RasterSurface {
    fn draw(&mut self, elements: &[Element]) -> Result<(), SurfaceError> {
        for element in elements {
            match element {
                Element::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                    corner_radius,
                } => self.fill(
                    rounded_rect(*x, *y, *width, *height, *corner_radius),
                    &solid(*fill),
                )?,
                Element::Circle { cx, cy, r, fill } => {
                    self.fill(PathBuilder::from_circle(*cx, *cy, *r), &solid(*fill))?
                }
                Element::GradientCircle {
                    cx,
                    cy,
                    r,
                    from,
                    to,
                } => {
                    let mut paint = solid(*from);
                    if let Some(shader) = LinearGradient::new(
                        Point::from_xy(cx - r, cy - r),
                        Point::from_xy(cx + r, cy + r),
                        vec![
                            GradientStop::new(0.0, sk_color(*from)),
                            GradientStop::new(1.0, sk_color(*to)),
                        ],
                        SpreadMode::Pad,
                        Transform::identity(),
                    ) {
                        paint.shader = shader;
                    }
                    self.fill(PathBuilder::from_circle(*cx, *cy, *r), &paint)?;
                }
                Element::Image {
                    x,
                    y,
                    width,
                    height,
                    pixels,
                    clip,
                } => self.image((*x, *y, *width, *height), pixels, *clip)?,
                Element::Text { .. } => self.text(element)?,
                Element::Badge { cx, cy, r, fill } => self.badge(*cx, *cy, *r, *fill)?,
            }
        }
        Ok(())
    }

    fn export(&mut self) -> Result<Vec<u8>, SurfaceError> {
        encode_pixmap(self.canvas()?)
    }
}
