//! Sitemap generation.
//!
//! Lists the most recent articles, in store order, for search engine indexing.
//!
//! # Sitemap Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://news.example.com/articles/storm-hits-coast-1b2c3d4e.html</loc>
//!     <lastmod>2024-01-01T00:00:00.000Z</lastmod>
//!   </url>
//! </urlset>
//! ```
//!
//! Without a configured site origin, `<loc>` stays site-relative. Articles
//! whose publish date does not parse get the store's generation time as
//! `<lastmod>`.

use super::write_atomic;
use crate::error::Result;
use crate::models::{StoreSnapshot, iso_timestamp};
use quick_xml::escape::escape;
use std::path::Path;
use tracing::{info, instrument};

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Build the sitemap for the first articles of `snapshot` and write it to `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), limit = limit))]
pub async fn write_sitemap(
    snapshot: &StoreSnapshot,
    base_url: Option<&str>,
    limit: usize,
    path: &Path,
) -> Result<()> {
    let sitemap = Sitemap::build(snapshot, base_url, limit);
    let urls = sitemap.urls.len();
    write_atomic(path, sitemap.into_xml().as_bytes()).await?;
    info!(urls, "Wrote sitemap");
    Ok(())
}

struct Sitemap {
    urls: Vec<UrlEntry>,
}

struct UrlEntry {
    loc: String,
    lastmod: String,
}

impl Sitemap {
    fn build(snapshot: &StoreSnapshot, base_url: Option<&str>, limit: usize) -> Self {
        let base_url = base_url.unwrap_or_default().trim_end_matches('/');
        let urls = snapshot
            .articles
            .iter()
            .take(limit)
            .map(|article| UrlEntry {
                loc: format!("{}{}", base_url, article.site_url),
                lastmod: article
                    .published_at()
                    .map(iso_timestamp)
                    .unwrap_or_else(|| snapshot.generated.clone()),
            })
            .collect();
        Self { urls }
    }

    fn into_xml(self) -> String {
        let mut xml = String::with_capacity(128 + self.urls.len() * 128);

        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<urlset xmlns=\"");
        xml.push_str(SITEMAP_NS);
        xml.push_str("\">\n");

        for entry in self.urls {
            xml.push_str("  <url>\n    <loc>");
            xml.push_str(&escape(entry.loc.as_str()));
            xml.push_str("</loc>\n    <lastmod>");
            xml.push_str(&escape(entry.lastmod.as_str()));
            xml.push_str("</lastmod>\n  </url>\n");
        }

        xml.push_str("</urlset>\n");
        xml
    }
}
