//! Progressive prompt simplification for image generation retries.
//!
//! Each retry of an image request uses a plainer prompt than the last:
//!
//! 1. the prompt as written
//! 2. simplified: style modifiers and parentheticals removed, first sentence only
//! 3. the subject: the leading noun phrase, at most six words
//! 4. a generic minimal prompt
//!
//! Duplicates are dropped, so a short prompt may yield fewer variants.

pub const MINIMAL_PROMPT: &str = "A clean, minimal abstract illustration with soft colors";

const STYLE_WORDS: &[&str] = &[
    "photorealistic",
    "hyper-realistic",
    "hyperrealistic",
    "ultra realistic",
    "highly detailed",
    "ultra detailed",
    "trending on artstation",
    "cinematic lighting",
    "dramatic lighting",
    "cinematic",
    "dramatic",
    "masterpiece",
    "8k",
    "4k",
];

const LEADING_FILLERS: &[&str] = &[
    "an image of ",
    "a picture of ",
    "a photo of ",
    "a photograph of ",
    "an illustration of ",
    "illustration of ",
    "image of ",
    "photo of ",
];

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_parentheticals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn first_sentence(s: &str) -> &str {
    s.split(['.', '!', '?', ';'])
        .map(str::trim)
        .find(|part| !part.is_empty())
        .unwrap_or("")
}

/// Drop style modifiers and everything after the first sentence.
pub fn simplify(prompt: &str) -> String {
    let mut text = strip_parentheticals(prompt).to_lowercase();
    for word in STYLE_WORDS {
        text = text.replace(word, " ");
    }
    let sentence = first_sentence(&text);
    let cleaned: Vec<&str> = sentence
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    collapse_whitespace(&cleaned.join(", "))
}

/// The leading noun phrase of the prompt, at most six words.
pub fn subject(prompt: &str) -> String {
    let simplified = simplify(prompt);
    let mut text = simplified.split(',').next().unwrap_or("").trim();
    for filler in LEADING_FILLERS {
        if let Some(rest) = text.strip_prefix(filler) {
            text = rest;
            break;
        }
    }
    for cut in [" with ", " in ", " on ", " at ", " showing "] {
        if let Some((head, _)) = text.split_once(cut) {
            text = head;
        }
    }
    text.split_whitespace().take(6).collect::<Vec<_>>().join(" ")
}

/// Prompts to use for attempts 0, 1, 2, ... in order. Never empty.
pub fn prompt_variants(prompt: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(4);
    let candidates = [
        collapse_whitespace(prompt),
        simplify(prompt),
        subject(prompt),
        MINIMAL_PROMPT.to_string(),
    ];
    for candidate in candidates {
        if candidate.is_empty() || out.iter().any(|c| c.eq_ignore_ascii_case(&candidate)) {
            continue;
        }
        out.push(candidate);
    }
    out
}
