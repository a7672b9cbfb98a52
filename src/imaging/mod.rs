//! Image work: drawing, encoding and validation.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Vector render** | scene → SVG → `usvg` + `resvg` |
//! | **Raster render** | `tiny_skia` paths and masks, glyphs via `usvg` |
//! | **PNG encode** | `image::codecs::png::PngEncoder` |
//! | **PNG validate** | custom chunk walker + CRC-32 |
//! | **Placeholders** | scene elements, rendered like any slide |
//! | **data: URLs** | `base64` + `image::guess_format` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for text and image layout (unit testable)
//! - **Parameters**: Sizes, colors and capture options
//! - **Backend**: [`Surface`] trait + [`Element`] scene primitives
//! - **Surfaces**: [`VectorSurface`] and [`RasterSurface`]
//! - **Placeholder / embed / png**: self-contained image helpers

pub mod backend;
mod calculations;
pub mod embed;
mod params;
pub mod placeholder;
pub mod png;
pub mod raster_backend;
mod svg;
pub mod vector_backend;

pub use backend::{Clip, Element, FontWeight, Surface, SurfaceError, TextAnchor};
pub use calculations::{
    WrappedLine, estimate_text_width, fit_within, font_size_for_text, join_lines, line_height,
    max_chars_per_line, wrap_text,
};
pub use embed::{EmbedError, EmbeddedImage, is_embedded};
pub use params::{CaptureOptions, Color, Size};
pub use placeholder::{content_placeholder, profile_avatar};
pub use png::{PngReport, is_valid_png};
pub use raster_backend::RasterSurface;
pub use svg::font_face_count;
pub use vector_backend::VectorSurface;
