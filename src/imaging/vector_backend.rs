//! Vector surface: collects elements, exports through SVG and `resvg`.
//!
//! This is the preferred renderer. It produces anti-aliased shapes and real
//! text when system fonts are available.

use super::backend::{Element, Surface, SurfaceError};
use super::params::CaptureOptions;
use super::svg::{rasterize, scene_to_svg};

pub struct VectorSurface {
    options: CaptureOptions,
    elements: Vec<Element>,
}

impl VectorSurface {
    pub fn new(options: &CaptureOptions) -> Self {
        Self {
            options: *options,
            elements: Vec::new(),
        }
    }

    /// SVG markup for everything drawn so far.
    pub fn to_svg(&self) -> Result<String, SurfaceError> {
        scene_to_svg(
            &self.elements,
            self.options.width,
            self.options.height,
            self.options.background,
        )
    }
}

impl Surface for VectorSurface {
    fn draw(&mut self, elements: &[Element]) -> Result<(), SurfaceError> {
        self.elements.extend_from_slice(elements);
        Ok(())
    }

    fn export(&mut self) -> Result<Vec<u8>, SurfaceError> {
        let svg = self.to_svg()?;
        rasterize(&svg, &self.options)
    }
}
