//! Content identity for feed items.
//!
//! [`fingerprint`] decides whether two feed items are the same story, and
//! [`make_slug`] names the page generated for it. Both are pure: the same
//! inputs produce the same output in every process, forever.

use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Longest title-derived prefix kept in a slug.
pub const SLUG_PREFIX_MAX: usize = 80;
/// Hex characters of the id hash appended to a slug.
const SLUG_HASH_LEN: usize = 8;
/// Prefix used when a title has no ASCII-representable characters.
const SLUG_FALLBACK_PREFIX: &str = "article";

static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Deduplication key for a feed item.
///
/// SHA-256 (lower-case hex) over `title|link|pub_date`, with absent fields
/// treated as empty strings. The publish date is the raw string from the feed,
/// not a parsed value, so a feed that rewrites its date format produces new
/// fingerprints.
pub fn fingerprint(title: Option<&str>, link: Option<&str>, pub_date: Option<&str>) -> String {
    let normalized = format!(
        "{}|{}|{}",
        title.unwrap_or_default(),
        link.unwrap_or_default(),
        pub_date.unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Filesystem- and URL-safe page name: `<title-prefix>-<hash8>`.
///
/// The title is transliterated to ASCII, lowercased, and every run of
/// non-alphanumerics becomes a single `-`. The suffix hashes `id` (or the
/// title when there is no id), so identical titles with different ids do not
/// share a page.
///
/// # Examples
///
/// ```ignore
/// let slug = make_slug("Storm hits coast!", Some("https://x/1"));
/// assert!(slug.starts_with("storm-hits-coast-"));
/// ```
pub fn make_slug(title: &str, id: Option<&str>) -> String {
    let ascii = deunicode(title).to_lowercase();
    let collapsed = NON_ALNUM_RUN.replace_all(&ascii, "-");
    // ASCII only at this point, so byte slicing is safe.
    let mut prefix = collapsed.trim_matches('-').to_string();
    prefix.truncate(SLUG_PREFIX_MAX);
    let prefix = prefix.trim_end_matches('-');
    let prefix = if prefix.is_empty() {
        SLUG_FALLBACK_PREFIX
    } else {
        prefix
    };

    let seed = id.filter(|s| !s.is_empty()).unwrap_or(title);
    let digest = format!("{:x}", Sha256::digest(seed.as_bytes()));
    format!("{}-{}", prefix, &digest[..SLUG_HASH_LEN])
}
