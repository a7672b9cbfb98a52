//! Minimal PNG structure validator.
//!
//! Checks what a viewer needs to open the file, without decoding pixels:
//! - the 8-byte signature
//! - every chunk's length, type and CRC-32 (over type + data)
//! - `IHDR` first with a 13-byte body and non-zero dimensions
//! - at least one `IDAT`
//! - `IEND` last, with nothing after it
//!
//! Chunk layout:
//!   Bytes 0-3:  Data length (big-endian u32)
//!   Bytes 4-7:  Chunk type (ASCII letters)
//!   Bytes 8+:   Data
//!   Last 4:     CRC-32 of type + data (big-endian)

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use std::fmt;
use thiserror::Error;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// CRC-32 (ISO-HDLC, as used by PNG) over the concatenation of `parts`.
pub fn crc32(parts: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for part in parts {
        for &byte in *part {
            crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
    }
    crc ^ 0xFFFF_FFFF
}

/// A structural problem found by [`validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PngIssue {
    #[error("empty buffer")]
    Empty,
    #[error("missing PNG signature")]
    BadSignature,
    #[error("chunk at byte {offset} is truncated")]
    Truncated { offset: usize },
    #[error("chunk at byte {offset} has an invalid type")]
    BadChunkType { offset: usize },
    #[error("{chunk} chunk at byte {offset} has a bad CRC")]
    BadCrc { chunk: String, offset: usize },
    #[error("first chunk is {0}, expected IHDR")]
    FirstChunkNotIhdr(String),
    #[error("IHDR is malformed")]
    BadIhdr,
    #[error("no IDAT chunk")]
    MissingIdat,
    #[error("no IEND chunk")]
    MissingIend,
    #[error("{0} bytes after IEND")]
    TrailingData(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub kind: String,
    pub length: u32,
    pub offset: usize,
}

/// Result of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PngReport {
    pub valid: bool,
    pub issues: Vec<PngIssue>,
    pub chunks: Vec<ChunkInfo>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub byte_len: usize,
}

impl fmt::Display for PngReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            match (self.width, self.height) {
                (Some(w), Some(h)) => write!(
                    f,
                    "valid PNG {w}x{h}, {} chunks, {} bytes",
                    self.chunks.len(),
                    self.byte_len
                ),
                _ => write!(f, "valid PNG, {} bytes", self.byte_len),
            }
        } else {
            let issues: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
            write!(f, "invalid PNG: {}", issues.join("; "))
        }
    }
}

/// Walk the chunk stream of `bytes` and report every structural issue.
///
/// Never panics on arbitrary input. A bad signature stops the walk since
/// nothing after it can be trusted.
pub fn validate(bytes: &[u8]) -> PngReport {
    let mut report = PngReport {
        byte_len: bytes.len(),
        ..PngReport::default()
    };

    if bytes.is_empty() {
        report.issues.push(PngIssue::Empty);
        return report;
    }
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        report.issues.push(PngIssue::BadSignature);
        return report;
    }

    let mut pos = PNG_SIGNATURE.len();
    let mut saw_iend = false;

    while pos < bytes.len() {
        if saw_iend {
            report.issues.push(PngIssue::TrailingData(bytes.len() - pos));
            break;
        }
        if pos + 12 > bytes.len() {
            report.issues.push(PngIssue::Truncated { offset: pos });
            break;
        }

        let length = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
        let kind_bytes = &bytes[pos + 4..pos + 8];
        if !kind_bytes.iter().all(u8::is_ascii_alphabetic) {
            report.issues.push(PngIssue::BadChunkType { offset: pos });
            break;
        }
        let kind = String::from_utf8_lossy(kind_bytes).into_owned();

        let data_start = pos + 8;
        let Some(data_end) = data_start.checked_add(length as usize) else {
            report.issues.push(PngIssue::Truncated { offset: pos });
            break;
        };
        if data_end + 4 > bytes.len() {
            report.issues.push(PngIssue::Truncated { offset: pos });
            break;
        }

        let data = &bytes[data_start..data_end];
        let stored_crc = u32::from_be_bytes([
            bytes[data_end],
            bytes[data_end + 1],
            bytes[data_end + 2],
            bytes[data_end + 3],
        ]);
        if crc32(&[kind_bytes, data]) != stored_crc {
            report.issues.push(PngIssue::BadCrc {
                chunk: kind.clone(),
                offset: pos,
            });
        }

        if report.chunks.is_empty() {
            if kind != "IHDR" {
                report.issues.push(PngIssue::FirstChunkNotIhdr(kind.clone()));
            } else if length != 13 {
                report.issues.push(PngIssue::BadIhdr);
            } else {
                let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                if width == 0 || height == 0 {
                    report.issues.push(PngIssue::BadIhdr);
                }
                report.width = Some(width);
                report.height = Some(height);
            }
        }

        if kind == "IEND" {
            saw_iend = true;
        }
        report.chunks.push(ChunkInfo {
            kind,
            length,
            offset: pos,
        });
        pos = data_end + 4;
    }

    if !report.chunks.iter().any(|c| c.kind == "IDAT") {
        report.issues.push(PngIssue::MissingIdat);
    }
    if !saw_iend {
        report.issues.push(PngIssue::MissingIend);
    }

    report.valid = report.issues.is_empty();
    report
}

pub fn is_valid_png(bytes: &[u8]) -> bool {
    validate(bytes).valid
}

/// Encode an RGBA8 buffer as PNG.
pub fn encode_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(rgba, width, height, image::ExtendedColorType::Rgba8)?;
    Ok(out)
}
