//! Utility functions for logging, JSON error classification, filename tokens,
//! and file system checks.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::Result;

/// Length of the random part of a filename token.
const TOKEN_RANDOM_LEN: usize = 7;

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` characters and get an ellipsis plus a count of
/// the dropped bytes.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A store snapshot cut short by a crash mid-write fails with an EOF error,
/// which is worth telling apart from a snapshot that is simply malformed.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Filename base that will not collide with earlier or concurrent downloads:
/// `<unix-millis>_<7 random lowercase alphanumerics>`.
pub fn unique_token() -> String {
    let suffix: String = rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await?;
    let _ = fs::remove_file(&probe_path).await;
    debug!("Directory is writable");
    Ok(())
}
