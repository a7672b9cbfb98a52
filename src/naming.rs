//! Output filenames for rendered slides.
//!
//! Every slide of a carousel is saved as
//! `slide-<NN>-<slug>.png`, where `NN` is the 1-based slide position padded
//! to two digits and `slug` identifies the account the carousel belongs to:
//! - `slide-01-ana-lima.png`
//! - `slide-12-rustacean.png` (handle `@Rustacean`)
//!
//! Sorting the files by name therefore keeps carousel order for up to 99
//! slides.

/// Name of the plain-text content summary written next to the slides.
pub const CONTENT_MANIFEST_FILENAME: &str = "carousel-content.txt";

/// Slug used when the identity has no usable characters.
pub const DEFAULT_SLUG: &str = "carousel";

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to
/// one dash, no leading or trailing dashes.
///
/// - `"Ana Lima"` → `"ana-lima"`
/// - `"@dev_rust!"` → `"dev-rust"`
/// - `"!!!"` → `"carousel"`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

/// Filename for the slide at `index` (0-based) of the carousel owned by
/// `identity` (handle or display name; a leading `@` is ignored).
pub fn slide_filename(index: usize, identity: &str) -> String {
    format!(
        "slide-{:02}-{}.png",
        index + 1,
        slugify(identity.trim().trim_start_matches('@'))
    )
}
