//! Pure layout calculations for slide text and images.
//!
//! All functions here are pure and testable without any I/O or images.
//! Text metrics are estimates from an average glyph width; the renderers
//! never measure real glyph advances.

use super::params::Size;

/// Average glyph advance as a fraction of the font size.
pub const GLYPH_WIDTH_RATIO: f32 = 0.55;

/// Line height as a multiple of the font size.
pub const LINE_HEIGHT_RATIO: f32 = 1.35;

/// Body font size for a given text length.
///
/// Starts at 48px and steps down as the text grows so long posts still fit
/// the canvas.
///
/// # Examples
/// ```
/// # use carousel_forge::imaging::font_size_for_text;
/// assert_eq!(font_size_for_text("short"), 48.0);
/// assert_eq!(font_size_for_text(&"x".repeat(150)), 42.0);
/// assert_eq!(font_size_for_text(&"x".repeat(301)), 32.0);
/// ```
pub fn font_size_for_text(text: &str) -> f32 {
    match text.chars().count() {
        n if n > 300 => 32.0,
        n if n > 200 => 36.0,
        n if n > 100 => 42.0,
        _ => 48.0,
    }
}

/// How many average-width glyphs fit on one line.
pub fn max_chars_per_line(font_size: f32, width: u32) -> usize {
    let glyph = (font_size * GLYPH_WIDTH_RATIO).max(1.0);
    ((width as f32 / glyph).floor() as usize).max(1)
}

/// Estimated rendered width of `text` in pixels.
pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * GLYPH_WIDTH_RATIO
}

pub fn line_height(font_size: f32) -> f32 {
    font_size * LINE_HEIGHT_RATIO
}

/// One output line of [`wrap_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedLine {
    pub text: String,
    /// The line ends with a `-` inserted by the wrapper because a word was
    /// split; the word continues on the next line.
    pub hyphenated: bool,
    /// Last line of a paragraph (an explicit newline follows in the source).
    pub paragraph_end: bool,
}

impl WrappedLine {
    fn new(text: String, hyphenated: bool) -> Self {
        Self {
            text,
            hyphenated,
            paragraph_end: false,
        }
    }
}

/// Greedy word wrap at `max_chars` characters per line.
///
/// Words longer than a line are split mid-word: each piece but the last
/// carries `max_chars - 1` characters plus a `-`. Explicit newlines start a
/// new paragraph; blank lines survive as empty lines. Runs of whitespace
/// inside a paragraph collapse to a single space. A width below 2 is
/// treated as 2 so a split piece always has room for its hyphen.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<WrappedLine> {
    let max = max_chars.max(2);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let start = lines.len();
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            let needed = if current.is_empty() {
                word_len
            } else {
                current_len + 1 + word_len
            };
            if needed <= max {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                current_len = needed;
                continue;
            }

            if !current.is_empty() {
                lines.push(WrappedLine::new(std::mem::take(&mut current), false));
            }

            let mut rest: Vec<char> = word.chars().collect();
            while rest.len() > max {
                let tail = rest.split_off(max - 1);
                let mut piece: String = rest.into_iter().collect();
                piece.push('-');
                lines.push(WrappedLine::new(piece, true));
                rest = tail;
            }
            current_len = rest.len();
            current = rest.into_iter().collect();
        }

        if !current.is_empty() || lines.len() == start {
            lines.push(WrappedLine::new(current, false));
        }
        if let Some(last) = lines.last_mut() {
            last.paragraph_end = true;
        }
    }

    lines
}

/// Reassemble wrapped lines into text: split words are rejoined, line breaks
/// inside a paragraph become spaces and paragraph ends become newlines.
pub fn join_lines(lines: &[WrappedLine]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if line.hyphenated {
            out.push_str(line.text.strip_suffix('-').unwrap_or(&line.text));
        } else {
            out.push_str(&line.text);
        }
        if i + 1 == lines.len() || line.hyphenated {
            continue;
        }
        out.push(if line.paragraph_end { '\n' } else { ' ' });
    }
    out
}

/// Scale `source` to fit entirely inside `bounds`, preserving aspect ratio.
///
/// Returns `None` for a zero-sized source or bounds.
pub fn fit_within(source: Size, bounds: Size) -> Option<Size> {
    if source.width == 0 || source.height == 0 || bounds.width == 0 || bounds.height == 0 {
        return None;
    }
    let scale = f64::min(
        bounds.width as f64 / source.width as f64,
        bounds.height as f64 / source.height as f64,
    );
    let w = ((source.width as f64 * scale).round() as u32).clamp(1, bounds.width);
    let h = ((source.height as f64 * scale).round() as u32).clamp(1, bounds.height);
    Some(Size::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[WrappedLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    /// Whitespace-normalized form of the input, per paragraph.
    fn normalized(text: &str) -> String {
        text.split('\n')
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    // =========================================================================
    // Font sizing
    // =========================================================================

    #[test]
    fn font_size_steps_at_thresholds() {
        assert_eq!(font_size_for_text(&"a".repeat(100)), 48.0);
        assert_eq!(font_size_for_text(&"a".repeat(101)), 42.0);
        assert_eq!(font_size_for_text(&"a".repeat(200)), 42.0);
        assert_eq!(font_size_for_text(&"a".repeat(201)), 36.0);
        assert_eq!(font_size_for_text(&"a".repeat(300)), 36.0);
        assert_eq!(font_size_for_text(&"a".repeat(301)), 32.0);
    }

    #[test]
    fn font_size_counts_chars_not_bytes() {
        // 60 two-byte characters = 120 bytes
        assert_eq!(font_size_for_text(&"é".repeat(60)), 48.0);
    }

    #[test]
    fn max_chars_uses_average_glyph_width() {
        // 920 / (48 * 0.55) = 34.8
        assert_eq!(max_chars_per_line(48.0, 920), 34);
        assert_eq!(max_chars_per_line(48.0, 1), 1);
    }

    // =========================================================================
    // wrap_text
    // =========================================================================

    #[test]
    fn wraps_greedily() {
        let lines = wrap_text("the quick brown fox jumps", 10);
        assert_eq!(texts(&lines), vec!["the quick", "brown fox", "jumps"]);
        assert!(lines.last().unwrap().paragraph_end);
    }

    #[test]
    fn exact_fit_stays_on_one_line() {
        let lines = wrap_text("abcde fghi", 10);
        assert_eq!(texts(&lines), vec!["abcde fghi"]);
    }

    #[test]
    fn long_word_is_hyphen_split() {
        let lines = wrap_text("abcdefghijkl", 5);
        assert_eq!(texts(&lines), vec!["abcd-", "efgh-", "ijkl"]);
        assert!(lines[0].hyphenated);
        assert!(!lines[2].hyphenated);
    }

    #[test]
    fn long_word_after_short_words() {
        let lines = wrap_text("hi supercalifragilistic ok", 8);
        assert_eq!(
            texts(&lines),
            vec!["hi", "superca-", "lifragi-", "listic", "ok"]
        );
    }

    #[test]
    fn newlines_start_paragraphs() {
        let lines = wrap_text("one\n\ntwo three", 20);
        assert_eq!(texts(&lines), vec!["one", "", "two three"]);
        assert!(lines.iter().all(|l| l.paragraph_end));
    }

    #[test]
    fn empty_text_yields_one_empty_line() {
        let lines = wrap_text("", 10);
        assert_eq!(texts(&lines), vec![""]);
    }

    #[test]
    fn no_line_exceeds_width() {
        let text = "Rust gives you memory safety without garbage collection, \
                    fearless concurrency and zero-cost abstractions. \
                    Pneumonoultramicroscopicsilicovolcanoconiosis included.";
        for max in [2usize, 3, 7, 12, 25, 80] {
            for line in wrap_text(text, max) {
                assert!(
                    line.text.chars().count() <= max,
                    "line {:?} exceeds {max}",
                    line.text
                );
            }
        }
    }

    #[test]
    fn joined_lines_reproduce_input() {
        let samples = [
            "Hello world",
            "  leading and   repeated   spaces  ",
            "Line one\nLine two\n\nAfter blank",
            "averyveryverylongwordthatneedssplitting and more",
            "ünïcödé wörds wrap by charactërs too",
        ];
        for text in samples {
            for max in [2usize, 4, 9, 30] {
                let lines = wrap_text(text, max);
                assert_eq!(join_lines(&lines), normalized(text), "max={max} text={text:?}");
            }
        }
    }

    #[test]
    fn width_below_two_is_clamped() {
        let lines = wrap_text("abc", 1);
        assert_eq!(texts(&lines), vec!["a-", "bc"]);
    }

    // =========================================================================
    // fit_within
    // =========================================================================

    #[test]
    fn fit_landscape_into_box() {
        assert_eq!(
            fit_within(Size::new(1600, 800), Size::new(920, 600)),
            Some(Size::new(920, 460))
        );
    }

    #[test]
    fn fit_portrait_limited_by_height() {
        assert_eq!(
            fit_within(Size::new(600, 1200), Size::new(920, 400)),
            Some(Size::new(200, 400))
        );
    }

    #[test]
    fn fit_upscales_small_images() {
        assert_eq!(
            fit_within(Size::new(100, 100), Size::new(400, 300)),
            Some(Size::new(300, 300))
        );
    }

    #[test]
    fn fit_zero_sizes_is_none() {
        assert_eq!(fit_within(Size::new(0, 10), Size::new(10, 10)), None);
        assert_eq!(fit_within(Size::new(10, 10), Size::new(10, 0)), None);
    }
}
