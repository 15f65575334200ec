//! One ingestion cycle, end to end.
//!
//! ```text
//! prepare dirs + fallback
//!   -> load store, build seen set
//!   -> fetch feeds (bounded concurrency, order preserved)
//!   -> per item: normalize, dedup, acquire image, write page
//!   -> merge, write snapshot, write sitemap
//! ```
//!
//! Errors never escape a cycle. A failing feed is skipped. A failing image
//! download falls back, and a failing page write is logged, but the article is
//! still stored. Whatever was produced is reported in the returned
//! [`CycleReport`].

use crate::config::Settings;
use crate::error::Result;
use crate::feeds::normalize::{ArticleDraft, normalize_item};
use crate::feeds::{ParsedFeed, fetch_feed};
use crate::fetch::Fetch;
use crate::images::{ImagePaths, ImageStore};
use crate::models::{Article, StoreSnapshot};
use crate::outputs::{json, pages, sitemap};
use crate::store;
use crate::utils::{ensure_writable_dir, unique_token};
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Feeds fetched at the same time.
const FEED_CONCURRENCY: usize = 4;

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    /// Items looked at, after the per-feed cap.
    pub items_seen: usize,
    pub duplicates_skipped: usize,
    pub new_articles: usize,
    /// New articles that ended up with the fallback image.
    pub image_fallbacks: usize,
    /// New articles whose page could not be written. They are still stored.
    pub page_failures: usize,
    /// Size of the store after merging.
    pub stored: usize,
}

/// Runs ingestion cycles against one set of settings and one fetcher.
#[derive(Debug)]
pub struct Ingestor<F> {
    settings: Settings,
    fetcher: F,
    images: ImageStore,
}

impl<F: Fetch> Ingestor<F> {
    pub fn new(settings: Settings, fetcher: F) -> Self {
        let images = ImageStore::new(settings.images_dir(), settings.images.clone());
        Self {
            settings,
            fetcher,
            images,
        }
    }

    /// Run one full cycle. Never fails; see the module docs.
    #[instrument(level = "info", skip_all, fields(feeds = self.settings.feeds.len()))]
    pub async fn run_cycle(&self) -> CycleReport {
        let t0 = Instant::now();
        let mut report = CycleReport::default();

        self.prepare().await;

        let prior = store::load_snapshot(&self.settings.store_file()).await;
        let mut seen = store::seen_fingerprints(&prior.articles);

        let fetched = self.fetch_all().await;
        let mut fresh = Vec::new();
        for (url, result) in fetched {
            match result {
                Ok(feed) => {
                    report.feeds_ok += 1;
                    self.ingest_feed(url, &feed, &mut seen, &mut fresh, &mut report)
                        .await;
                }
                Err(e) => {
                    report.feeds_failed += 1;
                    warn!(feed = %url, error = %e, "Feed failed; skipping");
                }
            }
        }
        report.new_articles = fresh.len();

        let merged = store::merge(fresh, prior.articles, self.settings.max_articles);
        report.stored = merged.len();
        self.persist(merged).await;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            feeds_ok = report.feeds_ok,
            feeds_failed = report.feeds_failed,
            items = report.items_seen,
            new = report.new_articles,
            skipped_duplicates = report.duplicates_skipped,
            image_fallbacks = report.image_fallbacks,
            page_failures = report.page_failures,
            stored = report.stored,
            "Cycle complete"
        );
        report
    }

    /// Make sure output directories are writable and the fallback exists.
    async fn prepare(&self) {
        for dir in [
            self.settings.images_dir(),
            self.settings.articles_dir(),
            self.settings.public_dir.clone(),
        ] {
            if let Err(e) = ensure_writable_dir(&dir).await {
                error!(dir = %dir.display(), error = %e, "Output directory is not writable");
            }
        }
        if let Err(e) = self.images.ensure_fallback(&self.settings.fallback_source()).await {
            warn!(error = %e, "Could not provision fallback image");
        }
    }

    /// Fetch every configured feed, a few at a time, keeping config order.
    async fn fetch_all(&self) -> Vec<(&str, Result<ParsedFeed>)> {
        let pending: Vec<_> = self
            .settings
            .feeds
            .iter()
            .map(|url| async move { (url.as_str(), fetch_feed(&self.fetcher, url).await) })
            .collect();
        stream::iter(pending)
            .buffered(FEED_CONCURRENCY)
            .collect()
            .await
    }

    #[instrument(level = "info", skip_all, fields(feed = %url))]
    async fn ingest_feed(
        &self,
        url: &str,
        feed: &ParsedFeed,
        seen: &mut HashSet<String>,
        fresh: &mut Vec<Article>,
        report: &mut CycleReport,
    ) {
        let source = feed.display_name(url);
        let now = Utc::now();
        let items = &feed.items[..feed.items.len().min(self.settings.max_items_per_feed)];
        let (mut new, mut duplicates, mut fallbacks) = (0usize, 0usize, 0usize);

        for item in items {
            let Some(draft) = normalize_item(item, seen, now) else {
                duplicates += 1;
                continue;
            };
            seen.insert(draft.fingerprint.clone());

            let (images, fell_back) = self.acquire_images(&draft).await;
            let article = draft.into_article(&source, images);
            if let Err(e) = pages::write_article_page(
                &article,
                &self.settings.articles_dir(),
                self.settings.base_url.as_deref(),
            )
            .await
            {
                warn!(slug = %article.slug, error = %e, "Page write failed; keeping article");
                report.page_failures += 1;
            }

            if fell_back {
                fallbacks += 1;
            }
            new += 1;
            fresh.push(article);
        }

        info!(
            %source,
            fetched = items.len(),
            skipped_duplicates = duplicates,
            new,
            image_fallbacks = fallbacks,
            "Feed processed"
        );
        report.items_seen += items.len();
        report.duplicates_skipped += duplicates;
        report.image_fallbacks += fallbacks;
    }

    /// Stored image paths for `draft`, and whether the fallback was used.
    async fn acquire_images(&self, draft: &ArticleDraft) -> (ImagePaths, bool) {
        let Some(url) = draft.image_url.as_deref() else {
            return (self.images.fallback(), true);
        };
        match self.images.acquire(&self.fetcher, url, &unique_token()).await {
            Some(variants) => (variants.into(), false),
            None => (self.images.fallback(), true),
        }
    }

    async fn persist(&self, articles: Vec<Article>) {
        let snapshot = StoreSnapshot::new(articles);
        if let Err(e) = json::write_snapshot(&snapshot, &self.settings.store_file()).await {
            error!(error = %e, "Failed to write article store");
        }
        if let Err(e) = sitemap::write_sitemap(
            &snapshot,
            self.settings.base_url.as_deref(),
            self.settings.sitemap_limit,
            &self.settings.sitemap_file(),
        )
        .await
        {
            error!(error = %e, "Failed to write sitemap");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    /// Serves canned bodies by URL and 404s everything else.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub(crate) fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    impl Fetch for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            self.bodies.get(url).cloned().ok_or_else(|| Error::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    pub(crate) fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(640, 480, Rgb([10, 120, 200]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    pub(crate) fn rss(title: &str, items: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>{title}</title><link>https://x/</link><description>d</description>
{}
</channel></rss>"#,
            items.join("\n")
        )
    }

    pub(crate) fn storm_item() -> String {
        r#"<item><title>Storm hits coast</title><link>https://x/1</link>
<guid isPermaLink="false">coast-1</guid>
<pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
<description><![CDATA[<p>Heavy <b>rain</b> reported</p>]]></description>
<enclosure url="https://x/1.jpg" length="1" type="image/jpeg"/></item>"#
            .to_string()
    }

    pub(crate) fn settings_in(root: &Path, feeds: &[&str]) -> Settings {
        Settings {
            feeds: feeds.iter().map(|f| f.to_string()).collect(),
            data_dir: root.join("data"),
            public_dir: root.join("public"),
            ..Settings::default()
        }
    }

    fn stored(settings: &Settings) -> StoreSnapshot {
        serde_json::from_slice(&std::fs::read(settings.store_file()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_storm_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        let fetcher = StubFetcher::default()
            .with("https://x/rss", rss("Coast News", &[storm_item()]))
            .with("https://x/1.jpg", jpeg_bytes());
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.feeds_ok, 1);
        assert_eq!(report.new_articles, 1);
        assert_eq!(report.image_fallbacks, 0);
        assert_eq!(report.stored, 1);

        let snapshot = stored(&settings);
        let article = &snapshot.articles[0];
        assert_eq!(article.title, "Storm hits coast");
        assert_eq!(article.excerpt, "Heavy rain reported");
        assert_eq!(article.source, "Coast News");
        assert_eq!(article.published, "2024-01-01T00:00:00.000Z");
        assert!(article.image.starts_with("/data/images/"));
        assert_ne!(article.image, "/data/images/fallback.jpg");
        assert_eq!(article.site_url, format!("/articles/{}.html", article.slug));

        let image_file = article.image.trim_start_matches("/data/images/");
        assert!(settings.images_dir().join(image_file).exists());

        let pages: Vec<_> = std::fs::read_dir(settings.articles_dir()).unwrap().collect();
        assert_eq!(pages.len(), 1);
        assert!(
            settings
                .articles_dir()
                .join(format!("{}.html", article.slug))
                .exists()
        );

        let sitemap = std::fs::read_to_string(settings.sitemap_file()).unwrap();
        assert_eq!(sitemap.matches("<url>").count(), 1);
        assert!(sitemap.contains(&article.site_url));
    }

    #[tokio::test]
    async fn test_image_failure_uses_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        let fetcher = StubFetcher::default().with("https://x/rss", rss("Coast News", &[storm_item()]));
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.new_articles, 1);
        assert_eq!(report.image_fallbacks, 1);

        let article = &stored(&settings).articles[0];
        assert_eq!(article.image, "/data/images/fallback.jpg");
        assert_eq!(article.thumb, "/data/images/thumb_fallback.jpg");
    }

    #[tokio::test]
    async fn test_two_cycles_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        let second = r#"<item><title>Bridge reopens</title><link>https://x/2</link>
<pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate></item>"#
            .to_string();
        let fetcher = StubFetcher::default()
            .with("https://x/rss", rss("Coast News", &[storm_item(), second]))
            .with("https://x/1.jpg", jpeg_bytes());
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let first = ingestor.run_cycle().await;
        assert_eq!(first.new_articles, 2);
        let before = stored(&settings);

        let again = ingestor.run_cycle().await;
        assert_eq!(again.new_articles, 0);
        assert_eq!(again.duplicates_skipped, 2);
        let after = stored(&settings);

        assert_eq!(before.articles, after.articles);
        assert_eq!(after.articles[0].title, "Bridge reopens");
        assert_eq!(ingestor.fetcher.calls_to("https://x/1.jpg"), 1);
    }

    #[tokio::test]
    async fn test_failed_feed_does_not_stop_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://down/rss", "https://garbage/rss", "https://x/rss"]);
        let fetcher = StubFetcher::default()
            .with("https://garbage/rss", "<html>maintenance</html>")
            .with("https://x/rss", rss("Coast News", &[storm_item()]));
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.feeds_failed, 2);
        assert_eq!(report.feeds_ok, 1);
        assert_eq!(stored(&settings).articles.len(), 1);
    }

    #[tokio::test]
    async fn test_per_feed_cap_and_in_cycle_dedup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = settings_in(tmp.path(), &["https://x/rss", "https://mirror/rss"]);
        settings.max_items_per_feed = 3;
        let items: Vec<String> = (0..5)
            .map(|i| format!("<item><title>Item {i}</title><link>https://x/{i}</link></item>"))
            .collect();
        let feed = rss("Coast News", &items);
        let fetcher = StubFetcher::default()
            .with("https://x/rss", feed.clone())
            .with("https://mirror/rss", feed);
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.items_seen, 6);
        assert_eq!(report.new_articles, 3);
        assert_eq!(report.duplicates_skipped, 3);
        let titles: Vec<_> = stored(&settings)
            .articles
            .into_iter()
            .map(|a| a.title)
            .collect();
        for t in ["Item 0", "Item 1", "Item 2"] {
            assert!(titles.iter().any(|x| x == t));
        }
    }

    #[tokio::test]
    async fn test_page_failure_keeps_article() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        std::fs::create_dir_all(&settings.public_dir).unwrap();
        std::fs::write(settings.articles_dir(), b"not a directory").unwrap();
        let fetcher = StubFetcher::default()
            .with("https://x/rss", rss("Coast News", &[storm_item()]))
            .with("https://x/1.jpg", jpeg_bytes());
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.page_failures, 1);
        assert_eq!(report.new_articles, 1);
        assert_eq!(report.stored, 1);
        let snapshot = stored(&settings);
        assert_eq!(snapshot.articles[0].title, "Storm hits coast");
        assert_ne!(snapshot.articles[0].image, "/data/images/fallback.jpg");

        let again = ingestor.run_cycle().await;
        assert_eq!(again.new_articles, 0);
        assert_eq!(again.duplicates_skipped, 1);
        assert_eq!(ingestor.fetcher.calls_to("https://x/1.jpg"), 1);
    }

    #[tokio::test]
    async fn test_inline_image_scenario_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        let item = r#"<item><title>Storm hits coast</title><link>https://x/1</link>
<pubDate>2024-01-01T00:00:00Z</pubDate>
<description><![CDATA[<p>Heavy <b>rain</b> reported</p><img src="https://x/1.jpg">]]></description></item>"#
            .to_string();
        let fetcher = StubFetcher::default()
            .with("https://x/rss", rss("Coast News", &[item]))
            .with("https://x/1.jpg", jpeg_bytes());
        let ingestor = Ingestor::new(settings.clone(), fetcher);

        let report = ingestor.run_cycle().await;
        assert_eq!(report.new_articles, 1);
        assert_eq!(report.image_fallbacks, 0);
        assert_eq!(ingestor.fetcher.calls_to("https://x/1.jpg"), 1);

        let article = &stored(&settings).articles[0];
        assert_eq!(article.excerpt, "Heavy rain reported");
        assert_eq!(article.published, "2024-01-01T00:00:00.000Z");
        assert_eq!(article.id, "https://x/1");
        let image_file = article.image.trim_start_matches("/data/images/");
        assert_ne!(image_file, "fallback.jpg");
        assert!(settings.images_dir().join(image_file).exists());
        let thumb_file = article.thumb.trim_start_matches("/data/images/");
        assert!(settings.images_dir().join(thumb_file).exists());

        let page = std::fs::read_to_string(
            settings
                .articles_dir()
                .join(format!("{}.html", article.slug)),
        )
        .unwrap();
        assert!(page.contains(&format!("<img src=\"{}\"", article.image)));
        assert_eq!(std::fs::read_dir(settings.articles_dir()).unwrap().count(), 1);

        let sitemap = std::fs::read_to_string(settings.sitemap_file()).unwrap();
        assert_eq!(sitemap.matches("<url>").count(), 1);
        assert!(sitemap.contains(&format!("<loc>{}</loc>", article.site_url)));
        assert!(sitemap.contains("<lastmod>2024-01-01T00:00:00.000Z</lastmod>"));
    }

    #[tokio::test]
    async fn test_corrupt_store_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), &["https://x/rss"]);
        std::fs::create_dir_all(&settings.data_dir).unwrap();
        std::fs::write(settings.store_file(), b"{\"generated\":").unwrap();
        let fetcher = StubFetcher::default().with("https://x/rss", rss("Coast News", &[storm_item()]));

        let report = Ingestor::new(settings.clone(), fetcher).run_cycle().await;
        assert_eq!(report.new_articles, 1);
        assert_eq!(stored(&settings).articles.len(), 1);
    }
}
