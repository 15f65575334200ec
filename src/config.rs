//! Runtime settings.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! command-line flags and environment variables. Every directory the pipeline
//! writes to is derived from two roots, `data_dir` and `public_dir`:
//!
//! ```text
//! data_dir/
//! ├── articles.json          # store snapshot
//! └── images/                # originals, full and thumbnail variants
//!
//! public_dir/
//! ├── assets/fallback.jpg    # fallback source image (provided by the operator)
//! ├── articles/<slug>.html   # one page per article
//! └── sitemap.xml
//! ```

use crate::cli::Cli;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// URL prefix under which `data_dir/images` is served.
pub const IMAGES_URL_PREFIX: &str = "/data/images/";
/// URL prefix under which `public_dir/articles` is served.
pub const ARTICLES_URL_PREFIX: &str = "/articles/";

/// Compression settings for the derived image variants.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageSettings {
    /// JPEG quality of the full-size variant.
    pub full_quality: u8,
    /// JPEG quality of the thumbnail variant.
    pub thumb_quality: u8,
    /// Maximum thumbnail width in pixels. Narrower images are not upscaled.
    pub thumb_width: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            full_quality: 75,
            thumb_quality: 70,
            thumb_width: 400,
        }
    }
}

/// Everything one ingestion cycle and the scheduler need to know.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Feed URLs, processed in order.
    pub feeds: Vec<String>,
    /// Timeout applied to each network request.
    pub timeout_ms: u64,
    /// Retries for transient feed failures (timeouts, 429, 5xx).
    pub max_retries: usize,
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Absolute site origin, e.g. `https://news.example.com`. When set, sitemap
    /// locations are absolute; otherwise they stay site-relative.
    pub base_url: Option<String>,
    pub images: ImageSettings,
    /// Only the first N items of every feed are considered.
    pub max_items_per_feed: usize,
    /// Retention bound of the article store.
    pub max_articles: usize,
    /// Number of most recent articles listed in the sitemap.
    pub sitemap_limit: usize,
    pub interval_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feeds: vec![
                "https://feeds.bbci.co.uk/news/world/rss.xml".to_string(),
                "https://rss.nytimes.com/services/xml/rss/nyt/World.xml".to_string(),
            ],
            timeout_ms: 15_000,
            max_retries: 2,
            user_agent: concat!("feed_press/", env!("CARGO_PKG_VERSION")).to_string(),
            data_dir: PathBuf::from("data"),
            public_dir: PathBuf::from("public"),
            base_url: None,
            images: ImageSettings::default(),
            max_items_per_feed: 20,
            max_articles: 1000,
            sitemap_limit: 500,
            interval_minutes: 15,
        }
    }
}

impl Settings {
    /// Build settings from defaults, the YAML file named by the CLI (if any),
    /// and CLI/environment overrides, then validate the result.
    ///
    /// # Errors
    ///
    /// Fails if the settings file cannot be read or parsed, or if a value is
    /// out of range.
    #[instrument(level = "info", skip_all)]
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => {
                let s = Self::from_yaml_file(path)?;
                info!(path = %path.display(), "Loaded settings file");
                s
            }
            None => Self::default(),
        };
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a YAML settings file. Keys that are absent keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(dir) = &cli.public_dir {
            self.public_dir = dir.clone();
        }
        if !cli.feeds.is_empty() {
            self.feeds = cli.feeds.clone();
        }
        if let Some(ms) = cli.timeout_ms {
            self.timeout_ms = ms;
        }
        if let Some(minutes) = cli.interval_minutes {
            self.interval_minutes = minutes;
        }
    }

    /// Reject values that would make the pipeline misbehave silently.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            return Err(Error::Config("interval_minutes must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be at least 1".into()));
        }
        if self.max_articles == 0 {
            return Err(Error::Config("max_articles must be at least 1".into()));
        }
        if self.images.thumb_width == 0 {
            return Err(Error::Config("images.thumb_width must be at least 1".into()));
        }
        for (name, q) in [
            ("images.full_quality", self.images.full_quality),
            ("images.thumb_quality", self.images.thumb_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(Error::Config(format!("{name} must be within 1..=100, got {q}")));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("articles.json")
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.public_dir.join("articles")
    }

    pub fn sitemap_file(&self) -> PathBuf {
        self.public_dir.join("sitemap.xml")
    }

    /// Source image copied into the image directory to back fallback references.
    pub fn fallback_source(&self) -> PathBuf {
        self.public_dir.join("assets").join("fallback.jpg")
    }
}
