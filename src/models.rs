//! Data models for the persisted article store.
//!
//! - [`Article`]: one ingested feed item, immutable once created
//! - [`StoreSnapshot`]: the single JSON document rewritten every cycle
//!
//! Field names are camelCase on the wire (`siteUrl`) because the static site
//! and its browser script read the snapshot directly.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A normalized feed item, ready to be rendered and stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Feed guid, else link, else a random token.
    pub id: String,
    /// Deduplication key over title, link and raw publish date.
    pub fingerprint: String,
    /// Filename stem of the article page and its route segment.
    pub slug: String,
    pub title: String,
    /// Canonical link to the original story.
    pub url: String,
    /// Display name of the feed the article came from.
    pub source: String,
    /// ISO-8601 publish time. Kept verbatim when the feed date is unparseable.
    pub published: String,
    /// Plain-text summary, at most 300 characters.
    pub excerpt: String,
    pub image: String,
    pub thumb: String,
    /// Site-relative path of the generated page.
    pub site_url: String,
}

impl Article {
    /// Publish time as a UTC instant, if `published` is RFC 3339 or RFC 2822.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.published)
    }
}

/// The persisted store: generation time plus articles, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSnapshot {
    pub generated: String,
    #[serde(default)]
    pub articles: Vec<Article>,
}

impl StoreSnapshot {
    /// Wrap `articles` in a snapshot stamped with the current time.
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            generated: iso_timestamp(Utc::now()),
            articles,
        }
    }

    /// A snapshot with no history, used when nothing usable is on disk.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Format an instant the way the store and sitemap expect it
/// (`2024-01-01T00:00:00.000Z`).
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse the date formats feeds actually use: RFC 3339 first, then RFC 2822.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
