//! Feed item normalization.
//!
//! [`normalize_item`] maps one [`FeedItem`] onto an [`ArticleDraft`]: every
//! article field except the image paths, which need network I/O. Items whose
//! fingerprint is already known are rejected here, before anything is
//! downloaded.

use crate::config::ARTICLES_URL_PREFIX;
use crate::feeds::FeedItem;
use crate::identity::{fingerprint, make_slug};
use crate::images::ImagePaths;
use crate::models::{Article, iso_timestamp};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::{RngCore, rng};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Maximum excerpt length, in characters.
pub const EXCERPT_MAX_CHARS: usize = 300;
const UNTITLED: &str = "Untitled";

static RESIDUAL_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Everything an [`Article`] needs except where its images ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub id: String,
    pub fingerprint: String,
    pub slug: String,
    pub title: String,
    pub url: String,
    pub published: String,
    pub excerpt: String,
    /// Best candidate for the article image, resolved to an absolute URL when
    /// the item link allows it.
    pub image_url: Option<String>,
}

impl ArticleDraft {
    /// Finish the record once image acquisition has succeeded or fallen back.
    pub fn into_article(self, source: &str, images: ImagePaths) -> Article {
        let site_url = format!("{}{}.html", ARTICLES_URL_PREFIX, self.slug);
        Article {
            id: self.id,
            fingerprint: self.fingerprint,
            slug: self.slug,
            title: self.title,
            url: self.url,
            source: source.to_string(),
            published: self.published,
            excerpt: self.excerpt,
            image: images.image,
            thumb: images.thumb,
            site_url,
        }
    }
}

/// Fingerprint of a feed item as it appears on the wire.
pub fn item_fingerprint(item: &FeedItem) -> String {
    fingerprint(item.title(), item.link(), item.raw_date().as_deref())
}

/// Normalize `item`, or return `None` if its fingerprint is in `seen`.
///
/// `now` stands in for the publish time when the feed gives none.
pub fn normalize_item(
    item: &FeedItem,
    seen: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<ArticleDraft> {
    let fp = item_fingerprint(item);
    if seen.contains(&fp) {
        return None;
    }

    let id = item
        .guid()
        .or_else(|| item.link())
        .map(str::to_owned)
        .unwrap_or_else(random_id);
    let title = item
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();
    let slug = make_slug(&title, Some(&id));

    Some(ArticleDraft {
        id,
        fingerprint: fp,
        slug,
        title,
        url: item.link().unwrap_or("#").to_string(),
        published: resolve_published(item, now),
        excerpt: item.excerpt_body().map(make_excerpt).unwrap_or_default(),
        image_url: extract_image_url(item),
    })
}

/// Publish time: normalized feed date, else the raw date string, else `now`.
pub fn resolve_published(item: &FeedItem, now: DateTime<Utc>) -> String {
    item.iso_date()
        .or_else(|| item.raw_date())
        .unwrap_or_else(|| iso_timestamp(now))
}

/// Image candidate, by priority: enclosure, first `<img src>` in the HTML
/// bodies, Media RSS URL.
pub fn extract_image_url(item: &FeedItem) -> Option<String> {
    let base = item.link().and_then(|l| Url::parse(l).ok());

    item.enclosure_url()
        .map(str::to_owned)
        .or_else(|| {
            item.html_bodies()
                .into_iter()
                .find_map(first_img_src)
        })
        .or_else(|| item.media_url().map(str::to_owned))
        .map(|raw| resolve_url(&raw, base.as_ref()))
}

/// `src` of the first `<img>` in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_owned)
}

fn resolve_url(raw: &str, base: Option<&Url>) -> String {
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    base.and_then(|b| b.join(raw).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Plain text of an HTML fragment: no tags, no attributes, no script or style
/// bodies, entities decoded, whitespace collapsed.
pub fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            text.push_str(chunk);
        }
    }

    // Double-escaped feeds decode into literal tags; drop those too.
    let text = RESIDUAL_TAG.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Markup-free excerpt of at most [`EXCERPT_MAX_CHARS`] characters.
pub fn make_excerpt(html: &str) -> String {
    let text = strip_markup(html);
    match text.char_indices().nth(EXCERPT_MAX_CHARS) {
        None => text,
        Some((cut, _)) => text[..cut].trim_end().to_string(),
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
