//! Self-contained image references (`data:` URLs).
//!
//! An embedded image carries its own bytes, so it renders without any
//! further network access. This is the currency the acquisition engine,
//! the placeholder generator and the compositor exchange.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("not an embedded image reference")]
    NotDataUrl,
    #[error("data URL is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// PNG bytes plus their pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EmbeddedImage {
    pub fn data_url(&self) -> String {
        to_data_url("image/png", &self.png)
    }
}

/// Decoded payload of a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// True for references that already embed an image payload.
pub fn is_embedded(url: &str) -> bool {
    url.get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
}

/// Split a `data:<mime>;base64,<payload>` URL into its MIME type and bytes.
pub fn parse_data_url(url: &str) -> Result<DataUrl, EmbedError> {
    let rest = url
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("data:"))
        .map(|_| &url[5..])
        .ok_or(EmbedError::NotDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(EmbedError::NotDataUrl)?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or(EmbedError::NotBase64)?;
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(DataUrl {
        mime: mime.to_ascii_lowercase(),
        bytes: STANDARD.decode(compact)?,
    })
}

/// MIME type of `bytes` if they start like a known image format.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, EmbedError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Decode the pixels behind an embedded reference.
pub fn decode_data_url(url: &str) -> Result<RgbaImage, EmbedError> {
    decode_rgba(&parse_data_url(url)?.bytes)
}

/// Decode arbitrary image bytes and re-encode them as PNG.
pub fn reencode_png(bytes: &[u8]) -> Result<EmbeddedImage, EmbedError> {
    let rgba = decode_rgba(bytes)?;
    let (width, height) = rgba.dimensions();
    let png = super::png::encode_rgba(width, height, rgba.as_raw())?;
    Ok(EmbeddedImage { png, width, height })
}
