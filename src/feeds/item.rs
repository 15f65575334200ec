//! The polymorphic feed item.
//!
//! RSS 2.0 items and Atom entries expose the same information under different
//! names and shapes. [`FeedItem`] wraps either one and answers the questions
//! the normalizer asks, with the per-format precedence spelled out in one
//! place.

use crate::models::{iso_timestamp, parse_timestamp};
use chrono::Utc;

/// One entry of a parsed feed.
#[derive(Debug, Clone)]
pub enum FeedItem {
    Rss(rss::Item),
    Atom(atom_syndication::Entry),
}

impl FeedItem {
    pub fn title(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => item.title(),
            FeedItem::Atom(entry) => non_empty(entry.title().as_str()),
        }
    }

    /// Link to the story. For Atom, the `alternate` link wins over the first one.
    pub fn link(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => item.link().and_then(non_empty),
            FeedItem::Atom(entry) => entry
                .links()
                .iter()
                .find(|l| l.rel() == "alternate")
                .or_else(|| entry.links().first())
                .map(|l| l.href())
                .and_then(non_empty),
        }
    }

    /// Publish date exactly as the feed wrote it. This is the string that goes
    /// into the fingerprint.
    pub fn raw_date(&self) -> Option<String> {
        match self {
            FeedItem::Rss(item) => item.pub_date().and_then(non_empty).map(str::to_owned),
            FeedItem::Atom(entry) => Some(
                entry
                    .published()
                    .unwrap_or_else(|| entry.updated())
                    .to_rfc3339(),
            ),
        }
    }

    /// Publish date normalized to `YYYY-MM-DDTHH:MM:SS.mmmZ`, if it parses.
    pub fn iso_date(&self) -> Option<String> {
        match self {
            FeedItem::Rss(item) => item
                .pub_date()
                .and_then(parse_timestamp)
                .map(iso_timestamp),
            FeedItem::Atom(entry) => {
                let at = entry.published().unwrap_or_else(|| entry.updated());
                Some(iso_timestamp(at.with_timezone(&Utc)))
            }
        }
    }

    /// Stable external identifier: RSS guid or Atom id.
    pub fn guid(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => item.guid().map(|g| g.value()).and_then(non_empty),
            FeedItem::Atom(entry) => non_empty(entry.id()),
        }
    }

    /// Explicit media attachment: RSS `<enclosure>` or an Atom `rel="enclosure"` link.
    pub fn enclosure_url(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => item.enclosure().map(|e| e.url()).and_then(non_empty),
            FeedItem::Atom(entry) => entry
                .links()
                .iter()
                .find(|l| l.rel() == "enclosure")
                .map(|l| l.href())
                .and_then(non_empty),
        }
    }

    /// HTML bodies in the order they are searched for an `<img>`: full content
    /// first, then the summary.
    pub fn html_bodies(&self) -> Vec<&str> {
        match self {
            FeedItem::Rss(item) => [item.content(), item.description()]
                .into_iter()
                .flatten()
                .collect(),
            FeedItem::Atom(entry) => [
                entry.content().and_then(|c| c.value()),
                entry.summary().map(|s| s.as_str()),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }

    /// Body the excerpt is cut from: the summary when present, else the content.
    pub fn excerpt_body(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => item.description().or_else(|| item.content()),
            FeedItem::Atom(entry) => entry
                .summary()
                .map(|s| s.as_str())
                .or_else(|| entry.content().and_then(|c| c.value())),
        }
    }

    /// URL from the Media RSS extension (`media:content`, then `media:thumbnail`).
    pub fn media_url(&self) -> Option<&str> {
        match self {
            FeedItem::Rss(item) => {
                let media = item.extensions().get("media")?;
                ["content", "thumbnail"]
                    .iter()
                    .filter_map(|name| media.get(*name))
                    .flatten()
                    .find_map(|ext| ext.attrs().get("url"))
                    .map(String::as_str)
                    .and_then(non_empty)
            }
            FeedItem::Atom(entry) => {
                let media = entry.extensions().get("media")?;
                ["content", "thumbnail"]
                    .iter()
                    .filter_map(|name| media.get(*name))
                    .flatten()
                    .find_map(|ext| ext.attrs().get("url"))
                    .map(String::as_str)
                    .and_then(non_empty)
            }
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
