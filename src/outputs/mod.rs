//! Everything the pipeline writes for the static site.
//!
//! # Submodules
//!
//! - [`json`]: the article store snapshot
//! - [`pages`]: one HTML page per article
//! - [`sitemap`]: `sitemap.xml` over the most recent articles
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! └── articles.json
//!
//! public_dir/
//! ├── articles/
//! │   ├── storm-hits-coast-1b2c3d4e.html
//! │   └── ...
//! └── sitemap.xml
//! ```
//!
//! Files other processes read while the pipeline runs are replaced through
//! [`write_atomic`], so readers see either the old or the new document.

pub mod json;
pub mod pages;
pub mod sitemap;

use crate::error::Result;
use crate::utils::unique_token;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", unique_token()));

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        warn!(tmp = %tmp.display(), error = %e, "Rename failed; removing temp file");
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!(path = %path.display(), bytes = bytes.len(), "Replaced file");
    Ok(())
}
