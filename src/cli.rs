//! Command-line interface definitions for Feed Press.
//!
//! Every option can also come from the environment. Anything left unset falls
//! back to the YAML settings file (if any) and then to built-in defaults; see
//! [`crate::config::Settings::load`].

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Feed Press daemon.
///
/// # Examples
///
/// ```sh
/// # Run forever with the default feed list, one cycle every 15 minutes
/// feed_press
///
/// # Single cycle against two feeds, then exit
/// feed_press --once -f https://feeds.bbci.co.uk/news/world/rss.xml -f https://example.com/atom.xml
///
/// # Settings file plus a different output root
/// feed_press -c ./feed_press.yaml -d /srv/news/data -p /srv/news/public
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "FEED_PRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the article store and downloaded images
    #[arg(short, long, env = "FEED_PRESS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding static assets, article pages and the sitemap
    #[arg(short, long, env = "FEED_PRESS_PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Feed URL to ingest; repeat the flag for several feeds. Replaces the configured list.
    #[arg(short = 'f', long = "feed", env = "FEED_PRESS_FEEDS", value_delimiter = ',')]
    pub feeds: Vec<String>,

    /// Timeout for every network request, in milliseconds
    #[arg(long, env = "FEED_PRESS_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Minutes between scheduled cycles
    #[arg(long, env = "FEED_PRESS_INTERVAL_MINUTES")]
    pub interval_minutes: Option<u64>,

    /// Run a single ingestion cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["feed_press"]);

        assert!(cli.config.is_none());
        assert!(cli.feeds.is_empty());
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "feed_press",
            "-c",
            "/etc/feed_press.yaml",
            "-d",
            "/tmp/data",
            "-p",
            "/tmp/public",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/feed_press.yaml")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
        assert_eq!(cli.public_dir, Some(PathBuf::from("/tmp/public")));
    }

    #[test]
    fn test_cli_repeated_and_delimited_feeds() {
        let cli = Cli::parse_from([
            "feed_press",
            "-f",
            "https://a.example/rss",
            "--feed",
            "https://b.example/rss,https://c.example/atom",
            "--once",
        ]);

        assert_eq!(
            cli.feeds,
            vec![
                "https://a.example/rss",
                "https://b.example/rss",
                "https://c.example/atom"
            ]
        );
        assert!(cli.once);
    }
}
