//! Static article pages.
//!
//! Each article gets `<articles_dir>/<slug>.html`: a self-contained document
//! with search and Open Graph metadata, the image, the excerpt and a link out
//! to the original story. Rendering is a pure function of the article (and the
//! configured site origin), so regenerating a page yields identical bytes.

use crate::error::Result;
use crate::models::{Article, iso_timestamp};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

/// Length cap of the `description` meta tag, in characters.
const DESCRIPTION_MAX_CHARS: usize = 150;

/// Render the HTML document for `article`.
///
/// `base_url`, when set, makes the Open Graph image absolute, which social
/// previews require.
pub fn render_article_page(article: &Article, base_url: Option<&str>) -> String {
    let title = article.title.as_str();
    let description: String = article.excerpt.chars().take(DESCRIPTION_MAX_CHARS).collect();
    let outbound = safe_href(&article.url);
    let og_image = absolute(&article.image, base_url);
    let published_at = article.published_at();
    let byline_time = published_at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| article.published.clone());

    let mut html = String::with_capacity(2048);
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n");
    let _ = writeln!(html, "<title>{}</title>", text(title));
    let _ = writeln!(html, "<meta name=\"description\" content=\"{}\">", attr(&description));
    let _ = writeln!(html, "<link rel=\"canonical\" href=\"{}\">", attr(outbound));
    html.push_str("<meta property=\"og:type\" content=\"article\">\n");
    let _ = writeln!(html, "<meta property=\"og:title\" content=\"{}\">", attr(title));
    let _ = writeln!(
        html,
        "<meta property=\"og:description\" content=\"{}\">",
        attr(&article.excerpt)
    );
    let _ = writeln!(html, "<meta property=\"og:image\" content=\"{}\">", attr(&og_image));
    if let Some(at) = published_at {
        let _ = writeln!(
            html,
            "<meta property=\"article:published_time\" content=\"{}\">",
            iso_timestamp(at)
        );
    }
    html.push_str("</head>\n<body>\n<article>\n");
    let _ = writeln!(html, "  <h1>{}</h1>", text(title));
    let _ = writeln!(
        html,
        "  <p><em>{} &middot; {}</em></p>",
        text(&article.source),
        text(&byline_time)
    );
    let _ = writeln!(
        html,
        "  <img src=\"{}\" alt=\"{}\" style=\"max-width:100%;height:auto\">",
        attr(&article.image),
        attr(title)
    );
    let _ = writeln!(html, "  <p>{}</p>", text(&article.excerpt));
    let _ = writeln!(
        html,
        "  <p><a href=\"{}\" target=\"_blank\" rel=\"noopener\">Read the original</a></p>",
        attr(outbound)
    );
    html.push_str("</article>\n</body>\n</html>\n");
    html
}

/// Render and write the page for `article`, returning its path.
#[instrument(level = "info", skip_all, fields(slug = %article.slug))]
pub async fn write_article_page(
    article: &Article,
    articles_dir: &Path,
    base_url: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(articles_dir).await?;
    let path = articles_dir.join(format!("{}.html", article.slug));
    fs::write(&path, render_article_page(article, base_url)).await?;
    debug!(path = %path.display(), "Wrote article page");
    Ok(path)
}

/// Links out are only emitted for `http(s)` URLs; anything else becomes `#`.
fn safe_href(url: &str) -> &str {
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => url,
        _ => "#",
    }
}

fn absolute<'a>(path: &'a str, base_url: Option<&str>) -> Cow<'a, str> {
    match base_url {
        Some(base) if path.starts_with('/') => {
            Cow::Owned(format!("{}{}", base.trim_end_matches('/'), path))
        }
        _ => Cow::Borrowed(path),
    }
}
