//! Feed retrieval and parsing.
//!
//! A feed is fetched through [`Fetch`], parsed as RSS 2.0 and, failing that,
//! as Atom. Either way the result is a [`ParsedFeed`]: an optional display
//! title plus a list of [`FeedItem`]s in document order.
//!
//! # Submodules
//!
//! - [`item`]: the RSS/Atom sum type and its field accessors
//! - [`normalize`]: turns one [`FeedItem`] into an article draft

pub mod item;
pub mod normalize;

pub use item::FeedItem;

use crate::error::{Error, Result};
use crate::fetch::Fetch;
use tracing::{debug, instrument};

/// A feed document reduced to what ingestion needs.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

impl ParsedFeed {
    /// Parse an RSS 2.0 or Atom document.
    ///
    /// # Errors
    ///
    /// [`Error::FeedParse`] carrying both readers' complaints when neither
    /// format matches.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let rss_err = match rss::Channel::read_from(bytes) {
            Ok(channel) => {
                return Ok(Self {
                    title: non_empty_title(channel.title()),
                    items: channel.items().iter().cloned().map(FeedItem::Rss).collect(),
                });
            }
            Err(e) => e,
        };

        match atom_syndication::Feed::read_from(bytes) {
            Ok(feed) => Ok(Self {
                title: non_empty_title(feed.title().as_str()),
                items: feed.entries().iter().cloned().map(FeedItem::Atom).collect(),
            }),
            Err(atom_err) => Err(Error::FeedParse(format!(
                "rss: {rss_err}; atom: {atom_err}"
            ))),
        }
    }

    /// Name shown as an article's `source`: the feed title, else its URL.
    pub fn display_name(&self, feed_url: &str) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| feed_url.to_string())
    }
}

fn non_empty_title(title: &str) -> Option<String> {
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Fetch and parse one feed.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_feed<F: Fetch>(fetcher: &F, url: &str) -> Result<ParsedFeed> {
    let body = fetcher.fetch(url).await?;
    let feed = ParsedFeed::parse(&body)?;
    debug!(items = feed.items.len(), title = ?feed.title, "Parsed feed");
    Ok(feed)
}
