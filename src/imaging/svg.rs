//! Scene elements → SVG markup → pixels.
//!
//! The markup is rasterized with `usvg` + `resvg`. Fonts come from the
//! system font database, loaded once per process. When no font matches,
//! `usvg` drops the text node and the rest of the scene still renders.

use super::backend::{Clip, Element, FontWeight, SurfaceError, TextAnchor};
use super::embed::to_data_url;
use super::params::{CaptureOptions, Color};
use super::png::encode_rgba;
use std::fmt::Write;
use std::sync::{Arc, LazyLock};

const FONT_FAMILY: &str = "Inter, 'Helvetica Neue', Helvetica, Arial, 'DejaVu Sans', sans-serif";

static FONTS: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    tracing::debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
});

/// Number of font faces available to the vector renderer.
pub fn font_face_count() -> usize {
    FONTS.len()
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn paint(color: Color) -> String {
    if color.a == 255 {
        format!("fill=\"{}\"", color.with_alpha(255).to_hex())
    } else {
        format!(
            "fill=\"{}\" fill-opacity=\"{:.3}\"",
            color.with_alpha(255).to_hex(),
            color.opacity()
        )
    }
}

/// Build a standalone SVG document for `elements` on a `width`×`height`
/// canvas filled with `background`.
pub fn scene_to_svg(
    elements: &[Element],
    width: u32,
    height: u32,
    background: Color,
) -> Result<String, SurfaceError> {
    let mut defs = String::new();
    let mut body = String::new();
    let mut next_id = 0usize;
    let mut id = |prefix: &str| {
        next_id += 1;
        format!("{prefix}{next_id}")
    };

    for element in elements {
        match element {
            Element::Rect {
                x,
                y,
                width,
                height,
                fill,
                corner_radius,
            } => {
                let _ = writeln!(
                    body,
                    r#"<rect x="{x}" y="{y}" width="{width}" height="{height}" rx="{corner_radius}" {}/>"#,
                    paint(*fill)
                );
            }
            Element::Circle { cx, cy, r, fill } => {
                let _ = writeln!(body, r#"<circle cx="{cx}" cy="{cy}" r="{r}" {}/>"#, paint(*fill));
            }
            Element::GradientCircle {
                cx,
                cy,
                r,
                from,
                to,
            } => {
                let gid = id("grad");
                let _ = writeln!(
                    defs,
                    r#"<linearGradient id="{gid}" x1="0" y1="0" x2="1" y2="1"><stop offset="0" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient>"#,
                    from.to_hex(),
                    to.to_hex()
                );
                let _ = writeln!(body, r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="url(#{gid})"/>"#);
            }
            Element::Image {
                x,
                y,
                width,
                height,
                pixels,
                clip,
            } => {
                let png = encode_rgba(pixels.width(), pixels.height(), pixels.as_raw())
                    .map_err(|e| SurfaceError::Scene(format!("embed image: {e}")))?;
                let clip_attr = match clip {
                    Clip::None => String::new(),
                    Clip::Circle => {
                        let cid = id("clip");
                        let r = width.min(*height) / 2.0;
                        let _ = writeln!(
                            defs,
                            r#"<clipPath id="{cid}"><circle cx="{}" cy="{}" r="{r}"/></clipPath>"#,
                            x + width / 2.0,
                            y + height / 2.0
                        );
                        format!(r#" clip-path="url(#{cid})""#)
                    }
                };
                let _ = writeln!(
                    body,
                    r#"<image x="{x}" y="{y}" width="{width}" height="{height}" preserveAspectRatio="none"{clip_attr} href="{}"/>"#,
                    to_data_url("image/png", &png)
                );
            }
            Element::Text { .. } => {
                if let Some(markup) = text_markup(element) {
                    let _ = writeln!(body, "{markup}");
                }
            }
            Element::Badge { cx, cy, r, fill } => {
                let _ = writeln!(body, r#"<circle cx="{cx}" cy="{cy}" r="{r}" {}/>"#, paint(*fill));
                let _ = writeln!(
                    body,
                    r##"<path d="M {} {} L {} {} L {} {}" fill="none" stroke="#ffffff" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/>"##,
                    cx - r * 0.45,
                    cy + r * 0.02,
                    cx - r * 0.12,
                    cy + r * 0.35,
                    cx + r * 0.48,
                    cy - r * 0.32,
                    r * 0.22
                );
            }
        }
    }

    Ok(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><defs>{defs}</defs><rect width="{width}" height="{height}" {}/>{body}</svg>"#,
        paint(background)
    ))
}

/// SVG `<text>` markup for a text element, `None` for anything else.
fn text_markup(element: &Element) -> Option<String> {
    let Element::Text {
        x,
        y,
        content,
        font_size,
        weight,
        fill,
        anchor,
    } = element
    else {
        return None;
    };
    let weight = match weight {
        FontWeight::Regular => "400",
        FontWeight::Bold => "700",
    };
    let anchor = match anchor {
        TextAnchor::Start => "start",
        TextAnchor::Middle => "middle",
    };
    Some(format!(
        r#"<text x="{x}" y="{y}" font-family="{FONT_FAMILY}" font-size="{font_size}" font-weight="{weight}" text-anchor="{anchor}" {}>{}</text>"#,
        paint(*fill),
        escape_xml(content)
    ))
}

fn parse(svg: &str) -> Result<usvg::Tree, SurfaceError> {
    let opts = usvg::Options {
        fontdb: Arc::clone(&FONTS),
        ..Default::default()
    };
    usvg::Tree::from_str(svg, &opts).map_err(|e| SurfaceError::Scene(e.to_string()))
}

/// Shape one text element against the shared font database. The tree spans
/// a `width`×`height` canvas, so its glyph outlines sit at canvas
/// coordinates.
pub fn text_tree(element: &Element, width: u32, height: u32) -> Result<usvg::Tree, SurfaceError> {
    let markup = text_markup(element)
        .ok_or_else(|| SurfaceError::Scene("not a text element".to_string()))?;
    parse(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">{markup}</svg>"#
    ))
}

/// Rasterize SVG markup at the capture options' pixel ratio and encode PNG.
pub fn rasterize(svg: &str, options: &CaptureOptions) -> Result<Vec<u8>, SurfaceError> {
    let tree = parse(svg)?;

    let out = options.output_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(out.width, out.height).ok_or_else(|| {
        SurfaceError::Render(format!("cannot allocate {out} pixmap"))
    })?;
    let sx = out.width as f32 / options.width.max(1) as f32;
    let sy = out.height as f32 / options.height.max(1) as f32;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(sx, sy),
        &mut pixmap.as_mut(),
    );

    encode_pixmap(&pixmap)
}

/// Un-premultiply a pixmap and encode it as PNG.
pub fn encode_pixmap(pixmap: &resvg::tiny_skia::Pixmap) -> Result<Vec<u8>, SurfaceError> {
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    encode_rgba(pixmap.width(), pixmap.height(), &rgba)
        .map_err(|e| SurfaceError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Size;
    use crate::imaging::png::validate;
    use image::RgbaImage;

    #[test]
    fn escape_xml_special_chars() {
        assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(escape_xml("tab\there"), "tabhere");
    }

    #[test]
    fn svg_contains_every_element() {
        let elements = vec![
            Element::GradientCircle {
                cx: 50.0,
                cy: 50.0,
                r: 40.0,
                from: Color::rgb(255, 0, 0),
                to: Color::rgb(0, 0, 255),
            },
            Element::Image {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 20.0,
                pixels: Arc::new(RgbaImage::new(2, 2)),
                clip: Clip::Circle,
            },
            Element::Text {
                x: 10.0,
                y: 90.0,
                content: "Tom & Jerry".into(),
                font_size: 12.0,
                weight: FontWeight::Bold,
                fill: Color::BLACK,
                anchor: TextAnchor::Start,
            },
        ];
        let svg = scene_to_svg(&elements, 100, 100, Color::WHITE).unwrap();
        assert!(svg.contains("linearGradient id=\"grad1\""));
        assert!(svg.contains("clip-path=\"url(#clip2)\""));
        assert!(svg.contains("href=\"data:image/png;base64,"));
        assert!(svg.contains("Tom &amp; Jerry"));
        assert!(svg.contains("font-weight=\"700\""));
    }

    #[test]
    fn translucent_fill_sets_opacity() {
        let svg = scene_to_svg(
            &[Element::Circle {
                cx: 1.0,
                cy: 1.0,
                r: 1.0,
                fill: Color::BLACK.with_alpha(128),
            }],
            4,
            4,
            Color::WHITE,
        )
        .unwrap();
        assert!(svg.contains("fill-opacity=\"0.502\""));
    }

    #[test]
    fn rasterize_applies_pixel_ratio() {
        let svg = scene_to_svg(&[], 30, 20, Color::rgb(10, 20, 30)).unwrap();
        let opts = CaptureOptions::new(Size::new(30, 20), Color::WHITE, 2.0);
        let png = rasterize(&svg, &opts).unwrap();
        let report = validate(&png);
        assert!(report.valid);
        assert_eq!((report.width, report.height), (Some(60), Some(40)));

        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(30, 20).0, [10, 20, 30, 255]);
    }

    #[test]
    fn text_tree_only_accepts_text() {
        let dot = Element::Circle {
            cx: 1.0,
            cy: 1.0,
            r: 1.0,
            fill: Color::BLACK,
        };
        assert!(matches!(text_tree(&dot, 10, 10), Err(SurfaceError::Scene(_))));

        let line = Element::Text {
            x: 5.0,
            y: 20.0,
            content: "a < b".into(),
            font_size: 16.0,
            weight: FontWeight::Regular,
            fill: Color::BLACK,
            anchor: TextAnchor::Start,
        };
        let tree = text_tree(&line, 100, 30).unwrap();
        assert_eq!(tree.size().width(), 100.0);
    }

    #[test]
    fn rasterize_rejects_broken_markup() {
        let opts = CaptureOptions::new(Size::new(10, 10), Color::WHITE, 1.0);
        assert!(matches!(
            rasterize("<svg", &opts),
            Err(SurfaceError::Scene(_))
        ));
    }
}
