//! Scene → validated PNG bytes.
//!
//! Renderers are tried in order until one produces a large enough image.
//! The result is then checked structurally ([`png::validate`]); a broken
//! file is rebuilt by drawing the scene again onto a plain raster at pixel
//! ratio 1. Capture only fails when every renderer and the rebuild fail.
//!
//! ```text
//! vector ──fail/too small──▶ raster ──fail/too small──▶ repair
//!    │                          │                          │
//!    └────────── ok ────────────┴──▶ validate ──invalid──▶ repair
//! ```

use crate::compose::Scene;
use crate::config::CanvasConfig;
use crate::fallback::first_success_blocking;
use crate::imaging::png::{self, PngReport};
use crate::imaging::{CaptureOptions, RasterSurface, Surface, SurfaceError, VectorSurface};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Built-in renderers, selectable by name in `[canvas] renderers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Scene → SVG → resvg.
    Vector,
    /// Scene painted straight onto a `tiny_skia` pixmap.
    Raster,
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererKind::Vector => write!(f, "vector"),
            RendererKind::Raster => write!(f, "raster"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not capture slide: {renderers}; repair also failed: {repair}")]
    Failed { renderers: String, repair: String },
    #[error("rebuilt image is still not a valid PNG ({0})")]
    StillInvalid(PngReport),
    #[error("rebuild failed: {0}")]
    Repair(#[from] SurfaceError),
}

/// Why one renderer's output was rejected.
#[derive(Error, Debug)]
enum RenderFailure {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("output too small ({len} bytes, need {min})")]
    TooSmall { len: usize, min: usize },
}

pub type SurfaceFactory = Arc<dyn Fn(&CaptureOptions) -> Box<dyn Surface> + Send + Sync>;

/// A renderer in the cascade: a name for logs plus a surface factory.
#[derive(Clone)]
pub struct NamedRenderer {
    name: String,
    factory: SurfaceFactory,
}

impl NamedRenderer {
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn(&CaptureOptions) -> Box<dyn Surface> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn builtin(kind: RendererKind) -> Self {
        match kind {
            RendererKind::Vector => Self::new(kind.to_string(), |opts| {
                Box::new(VectorSurface::new(opts)) as Box<dyn Surface>
            }),
            RendererKind::Raster => Self::new(kind.to_string(), |opts| {
                Box::new(RasterSurface::new(opts)) as Box<dyn Surface>
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NamedRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for NamedRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedRenderer").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub png: Vec<u8>,
    /// Renderer that produced the bytes, or `"repair"`.
    pub renderer: String,
    /// The bytes were rebuilt because the renderer's output was unusable.
    pub repaired: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureEngine {
    min_bytes: usize,
    renderers: Vec<NamedRenderer>,
}

impl CaptureEngine {
    pub fn new(min_bytes: usize, renderers: Vec<NamedRenderer>) -> Self {
        Self {
            min_bytes,
            renderers,
        }
    }

    pub fn from_config(canvas: &CanvasConfig) -> Self {
        Self::new(
            canvas.min_capture_bytes,
            canvas
                .renderers
                .iter()
                .map(|kind| NamedRenderer::builtin(*kind))
                .collect(),
        )
    }

    pub fn renderer_names(&self) -> Vec<&str> {
        self.renderers.iter().map(NamedRenderer::name).collect()
    }

    pub fn capture(
        &self,
        scene: &Scene,
        options: &CaptureOptions,
    ) -> Result<CaptureOutcome, CaptureError> {
        let rendered = first_success_blocking(self.renderers.iter().cloned(), |renderer| {
            self.render_with(renderer, scene, options)
        });

        match rendered {
            Ok((renderer, png)) => {
                let (png, repaired) = ensure_valid(png, scene, options)?;
                debug!(renderer = %renderer, bytes = png.len(), repaired, "slide captured");
                Ok(CaptureOutcome {
                    png,
                    renderer: renderer.name,
                    repaired,
                })
            }
            Err(failed) => {
                warn!("{failed}, rebuilding on a plain raster");
                match repair(scene, options) {
                    Ok(png) => Ok(CaptureOutcome {
                        png,
                        renderer: "repair".to_string(),
                        repaired: true,
                    }),
                    Err(e) => Err(CaptureError::Failed {
                        renderers: failed.to_string(),
                        repair: e.to_string(),
                    }),
                }
            }
        }
    }

    fn render_with(
        &self,
        renderer: &NamedRenderer,
        scene: &Scene,
        options: &CaptureOptions,
    ) -> Result<Vec<u8>, RenderFailure> {
        let mut surface = (renderer.factory)(options);
        surface.draw(&scene.elements)?;
        let png = surface.export()?;
        if png.len() < self.min_bytes {
            return Err(RenderFailure::TooSmall {
                len: png.len(),
                min: self.min_bytes,
            });
        }
        Ok(png)
    }
}

/// Return `png` untouched if it is structurally valid, otherwise a rebuilt
/// image. The flag says whether a rebuild happened.
pub fn ensure_valid(
    png: Vec<u8>,
    scene: &Scene,
    options: &CaptureOptions,
) -> Result<(Vec<u8>, bool), CaptureError> {
    let report = png::validate(&png);
    if report.valid {
        return Ok((png, false));
    }
    warn!(%report, "captured bytes are not a valid PNG, rebuilding");
    Ok((repair(scene, options)?, true))
}

/// Redraw `scene` onto a fresh raster at pixel ratio 1 and re-validate.
fn repair(scene: &Scene, options: &CaptureOptions) -> Result<Vec<u8>, CaptureError> {
    let mut surface = RasterSurface::new(&options.at_unit_scale());
    surface.draw(&scene.elements)?;
    let png = surface.export()?;
    let report = png::validate(&png);
    if !report.valid {
        return Err(CaptureError::StillInvalid(report));
    }
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::RecordingSurface;
    use crate::imaging::{Color, Element, Size};

    fn options() -> CaptureOptions {
        CaptureOptions::new(Size::new(120, 150), Color::WHITE, 1.0)
    }

    fn scene() -> Scene {
        Scene {
            size: Size::new(120, 150),
            background: Color::WHITE,
            elements: vec![Element::Rect {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 40.0,
                fill: Color::rgb(0x1d, 0x9b, 0xf0),
                corner_radius: 6.0,
            }],
        }
    }

    fn canned(name: &str, bytes: Vec<u8>) -> NamedRenderer {
        NamedRenderer::new(name, move |_| {
            Box::new(RecordingSurface::new(bytes.clone())) as Box<dyn Surface>
        })
    }

    fn broken(name: &str) -> NamedRenderer {
        NamedRenderer::new(name, |_| Box::new(RecordingSurface::failing()) as Box<dyn Surface>)
    }

    fn corrupt_png() -> Vec<u8> {
        let mut png = crate::test_helpers::sample_png(40, 40);
        png[1] = b'X';
        png.resize(png.len().max(600), 0);
        png
    }

    // =========================================================================
    // Cascade
    // =========================================================================

    #[test]
    fn default_renderers_in_config_order() {
        let engine = CaptureEngine::from_config(&CanvasConfig::default());
        assert_eq!(engine.renderer_names(), vec!["vector", "raster"]);
    }

    #[test]
    fn first_renderer_wins() {
        let engine = CaptureEngine::new(0, vec![
            NamedRenderer::builtin(RendererKind::Vector),
            NamedRenderer::builtin(RendererKind::Raster),
        ]);
        let outcome = engine.capture(&scene(), &options()).unwrap();
        assert_eq!(outcome.renderer, "vector");
        assert!(!outcome.repaired);
        assert!(png::is_valid_png(&outcome.png));
    }

    #[test]
    fn failing_renderer_falls_through() {
        let engine = CaptureEngine::new(0, vec![
            broken("flaky"),
            NamedRenderer::builtin(RendererKind::Raster),
        ]);
        let outcome = engine.capture(&scene(), &options()).unwrap();
        assert_eq!(outcome.renderer, "raster");
    }

    #[test]
    fn undersized_output_counts_as_failure() {
        let engine = CaptureEngine::new(100, vec![
            canned("tiny", vec![0u8; 10]),
            canned("big", crate::test_helpers::sample_png(60, 60)),
        ]);
        let outcome = engine.capture(&scene(), &options()).unwrap();
        assert_eq!(outcome.renderer, "big");
    }

    #[test]
    fn all_renderers_failing_still_yields_repaired_png() {
        let engine = CaptureEngine::new(0, vec![broken("a"), broken("b")]);
        let outcome = engine.capture(&scene(), &options()).unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.renderer, "repair");
        let report = png::validate(&outcome.png);
        assert!(report.valid);
        assert_eq!(report.width, Some(120));
    }

    // =========================================================================
    // Validation and repair
    // =========================================================================

    #[test]
    fn corrupted_signature_is_rebuilt() {
        let engine = CaptureEngine::new(0, vec![canned("corrupt", corrupt_png())]);
        let outcome = engine.capture(&scene(), &options()).unwrap();
        assert_eq!(outcome.renderer, "corrupt");
        assert!(outcome.repaired);
        assert!(png::is_valid_png(&outcome.png));
    }

    #[test]
    fn repair_uses_unit_pixel_ratio() {
        let opts = CaptureOptions::new(Size::new(120, 150), Color::WHITE, 2.0);
        let (png, repaired) = ensure_valid(corrupt_png(), &scene(), &opts).unwrap();
        assert!(repaired);
        let report = png::validate(&png);
        assert_eq!((report.width, report.height), (Some(120), Some(150)));
    }

    #[test]
    fn valid_bytes_pass_through_untouched() {
        let bytes = crate::test_helpers::sample_png(8, 8);
        let (png, repaired) = ensure_valid(bytes.clone(), &scene(), &options()).unwrap();
        assert!(!repaired);
        assert_eq!(png, bytes);
    }

    #[test]
    fn renderer_kind_serde_names() {
        let kinds: Vec<RendererKind> = serde_json::from_str(r#"["raster","vector"]"#).unwrap();
        assert_eq!(kinds, vec![RendererKind::Raster, RendererKind::Vector]);
    }
}
