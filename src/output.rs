//! CLI output formatting for every command.
//!
//! # Slide-First Display
//!
//! Output leads with the slide: its 1-based position and a preview of its
//! text. Image state, file names and renderer details follow as indented
//! context lines, so the output reads as a content inventory of the
//! carousel.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! Ana Lima (@analima) ✓
//! 01 Most habits fail in the first week...
//!     Image: generated
//! 02 Start with two minutes a day
//!     Image: placeholder
//!
//! Caption
//!     Five ideas in five slides.
//! Hashtags
//!     #rust #tips
//!
//! Images: 2 requested, 1 generated, 1 placeholder
//! ```
//!
//! ## Render
//!
//! ```text
//! [1/5] rendering  Rendering slide 2
//! 01 slide-01-analima.png (48213 bytes)
//!     Renderer: vector
//! 02 slide-02-analima.png (51877 bytes)
//!     Renderer: raster, repaired
//!     Content image: placeholder
//!
//! Saved 2 of 2 slides
//! Content: out/carousel-content.txt
//! Images: 3 images: 1 cached, 2 resolved (2 original)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::cache::AcquisitionStats;
use crate::download::{BatchReport, SavedSlide};
use crate::generation::ImageBatch;
use crate::imaging::PngReport;
use crate::types::{CarouselData, DownloadProgress, Slide};

const PREVIEW_CHARS: usize = 60;

// ============================================================================
// Shared helpers
// ============================================================================

/// 1-based position padded to two digits, matching slide file names.
fn format_index(pos: usize) -> String {
    format!("{:0>2}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// First line of `text`, cut to `max` characters with `...` appended.
fn preview(text: &str, max: usize) -> String {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let multiline = text.trim().lines().count() > 1;
    if first.chars().count() > max {
        let cut: String = first.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    } else if multiline {
        format!("{first}...")
    } else {
        first.to_string()
    }
}

/// Short description of a slide's image state, if it has one.
fn image_state(slide: &Slide) -> Option<&'static str> {
    if slide.custom_image_url.is_some() {
        return Some("custom");
    }
    match (slide.image_generated, slide.fallback_used) {
        (_, Some(true)) => Some("placeholder"),
        (Some(true), _) => Some("generated"),
        _ if slide.content_image_urls.is_some() => Some("attached"),
        _ if slide.wants_image() => Some("pending"),
        _ => None,
    }
}

// ============================================================================
// Generate
// ============================================================================

pub fn format_carousel(carousel: &CarouselData) -> Vec<String> {
    let mut lines = Vec::new();
    let handle = carousel.handle.trim().trim_start_matches('@');
    let badge = if carousel.is_verified { " ✓" } else { "" };
    lines.push(format!("{} (@{}){}", carousel.display_name, handle, badge));

    for (i, slide) in carousel.slides.iter().enumerate() {
        let edited = if slide.is_edited { " (edited)" } else { "" };
        lines.push(format!(
            "{} {}{}",
            format_index(i + 1),
            preview(&slide.text, PREVIEW_CHARS),
            edited
        ));
        if let Some(state) = image_state(slide) {
            lines.push(format!("{}Image: {}", indent(1), state));
        }
    }

    if !carousel.caption.trim().is_empty() {
        lines.push(String::new());
        lines.push("Caption".to_string());
        for line in carousel.caption.trim().lines() {
            lines.push(format!("{}{}", indent(1), line));
        }
    }
    if !carousel.hashtags.is_empty() {
        lines.push("Hashtags".to_string());
        lines.push(format!("{}{}", indent(1), carousel.hashtags.join(" ")));
    }
    lines
}

pub fn format_image_batch(batch: &ImageBatch) -> String {
    format!(
        "Images: {} requested, {} generated, {} placeholder",
        batch.requested(),
        batch.generated,
        batch.fallbacks
    )
}

pub fn print_carousel(carousel: &CarouselData, batch: Option<&ImageBatch>) {
    for line in format_carousel(carousel) {
        println!("{}", line);
    }
    if let Some(batch) = batch.filter(|b| b.requested() > 0) {
        println!();
        println!("{}", format_image_batch(batch));
    }
}

// ============================================================================
// Render
// ============================================================================

/// One progress update on one line.
///
/// ```text
/// [1/5] rendering  Rendering slide 2
/// ```
pub fn format_progress(progress: &DownloadProgress) -> String {
    let head = format!(
        "[{}/{}] {:<11}",
        progress.current,
        progress.total,
        progress.status.to_string()
    );
    match &progress.message {
        Some(message) => format!("{}{}", head, message),
        None => head.trim_end().to_string(),
    }
}

pub fn format_saved_slide(slide: &SavedSlide) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} ({} bytes)",
        format_index(slide.index + 1),
        slide.filename,
        slide.bytes
    )];
    let repaired = if slide.repaired { ", repaired" } else { "" };
    lines.push(format!("{}Renderer: {}{}", indent(1), slide.renderer, repaired));
    if slide.fallback_used {
        lines.push(format!("{}Content image: placeholder", indent(1)));
    }
    lines
}

pub fn format_batch_report(report: &BatchReport) -> Vec<String> {
    let mut lines = Vec::new();
    for slide in &report.saved {
        lines.extend(format_saved_slide(slide));
    }
    for failure in &report.failed {
        lines.push(format!(
            "{} failed: {}",
            format_index(failure.index + 1),
            failure.message
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "Saved {} of {} slides",
        report.saved.len(),
        report.total
    ));
    if let Some(manifest) = &report.manifest {
        lines.push(format!("Content: {}", manifest.display()));
    }
    lines
}

pub fn format_acquisition_stats(stats: &AcquisitionStats) -> Option<String> {
    (stats.requests > 0).then(|| format!("Images: {}", stats))
}

pub fn print_progress(progress: &DownloadProgress) {
    println!("{}", format_progress(progress));
}

pub fn print_batch_report(report: &BatchReport, stats: &AcquisitionStats) {
    for line in format_batch_report(report) {
        println!("{}", line);
    }
    if let Some(line) = format_acquisition_stats(stats) {
        println!("{}", line);
    }
}

// ============================================================================
// PNG check
// ============================================================================

/// Verdict line, then one indented line per chunk when `verbose`.
pub fn format_png_report(name: &str, report: &PngReport, verbose: bool) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", name, report)];
    if verbose {
        for chunk in &report.chunks {
            lines.push(format!(
                "{}{} {} bytes @ {}",
                indent(1),
                chunk.kind,
                chunk.length,
                chunk.offset
            ));
        }
    }
    lines
}

pub fn print_png_report(name: &str, report: &PngReport, verbose: bool) {
    for line in format_png_report(name, report, verbose) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::SlideFailure;
    use crate::imaging::png;
    use crate::test_helpers::{sample_carousel, sample_png};
    use crate::types::DownloadStatus;
    use std::path::PathBuf;

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn format_index_pads_to_two() {
        assert_eq!(format_index(1), "01");
        assert_eq!(format_index(12), "12");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn preview_short_text() {
        assert_eq!(preview("Hello", 10), "Hello");
    }

    #[test]
    fn preview_long_text_is_cut() {
        assert_eq!(preview("abcdefghijkl", 5), "abcde...");
    }

    #[test]
    fn preview_multiline_shows_first_line() {
        assert_eq!(preview("\nFirst\nSecond", 40), "First...");
    }

    #[test]
    fn preview_counts_chars_not_bytes() {
        assert_eq!(preview("ééééé", 5), "ééééé");
    }

    #[test]
    fn image_state_variants() {
        let mut slide = Slide::new(1, "x");
        assert_eq!(image_state(&slide), None);
        slide.image_prompt = Some("a cat".into());
        assert_eq!(image_state(&slide), Some("pending"));
        slide.image_generated = Some(true);
        slide.fallback_used = Some(false);
        assert_eq!(image_state(&slide), Some("generated"));
        slide.fallback_used = Some(true);
        assert_eq!(image_state(&slide), Some("placeholder"));
        slide.custom_image_url = Some("https://cdn.test/mine.png".into());
        assert_eq!(image_state(&slide), Some("custom"));
    }

    // =========================================================================
    // Generate
    // =========================================================================

    #[test]
    fn carousel_lists_slides_caption_and_tags() {
        let mut carousel = sample_carousel(2);
        carousel.is_verified = true;
        carousel.slides[1].edit_text("Changed");
        let lines = format_carousel(&carousel);
        assert_eq!(lines[0], "Ana Lima (@analima) ✓");
        assert_eq!(lines[1], "01 Slide 1: one idea worth sharing.");
        assert_eq!(lines[2], "02 Changed (edited)");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Caption");
        assert_eq!(lines[5], "    Five ideas in five slides.");
        assert_eq!(lines[6], "Hashtags");
        assert_eq!(lines[7], "    #rust #tips");
    }

    #[test]
    fn image_batch_summary() {
        let batch = ImageBatch {
            generated: 3,
            fallbacks: 1,
        };
        assert_eq!(
            format_image_batch(&batch),
            "Images: 4 requested, 3 generated, 1 placeholder"
        );
    }

    // =========================================================================
    // Render
    // =========================================================================

    #[test]
    fn progress_with_and_without_message() {
        let p = DownloadProgress::new(1, 5, DownloadStatus::Rendering).with_message("Rendering slide 2");
        assert_eq!(format_progress(&p), "[1/5] rendering  Rendering slide 2");
        let p = DownloadProgress::new(5, 5, DownloadStatus::Complete);
        assert_eq!(format_progress(&p), "[5/5] complete");
    }

    #[test]
    fn batch_report_lines() {
        let report = BatchReport {
            total: 3,
            saved: vec![SavedSlide {
                index: 0,
                filename: "slide-01-analima.png".into(),
                location: PathBuf::from("out/slide-01-analima.png"),
                bytes: 1200,
                renderer: "raster".into(),
                repaired: true,
                fallback_used: true,
            }],
            failed: vec![SlideFailure {
                index: 2,
                message: "disk full".into(),
            }],
            manifest: Some(PathBuf::from("out/carousel-content.txt")),
        };
        let lines = format_batch_report(&report);
        assert_eq!(
            lines,
            vec![
                "01 slide-01-analima.png (1200 bytes)",
                "    Renderer: raster, repaired",
                "    Content image: placeholder",
                "03 failed: disk full",
                "",
                "Saved 1 of 3 slides",
                "Content: out/carousel-content.txt",
            ]
        );
    }

    #[test]
    fn empty_stats_print_nothing() {
        assert_eq!(format_acquisition_stats(&AcquisitionStats::default()), None);
    }

    // =========================================================================
    // PNG check
    // =========================================================================

    #[test]
    fn png_report_verbose_lists_chunks() {
        let report = png::validate(&sample_png(4, 4));
        let lines = format_png_report("a.png", &report, true);
        assert!(lines[0].starts_with("a.png: valid PNG 4x4"));
        assert!(lines[1].starts_with("    IHDR 13 bytes @ "));
        assert!(lines.last().unwrap().starts_with("    IEND 0 bytes"));
    }

    #[test]
    fn png_report_invalid() {
        let report = png::validate(b"not a png");
        let lines = format_png_report("b.png", &report, false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("b.png: invalid PNG"));
    }
}
