//! The persisted article store.
//!
//! The store is one JSON snapshot rewritten at the end of every cycle. Loading
//! is forgiving: a missing, truncated, or malformed snapshot is treated as an
//! empty history so that a bad write can never wedge ingestion.

use crate::error::Result;
use crate::models::{Article, StoreSnapshot};
use crate::utils::looks_truncated;
use itertools::Itertools;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Read the snapshot at `path`, degrading to an empty store on any problem.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_snapshot(path: &Path) -> StoreSnapshot {
    match read_snapshot(path).await {
        Ok(Some(snapshot)) => {
            info!(articles = snapshot.articles.len(), "Loaded article store");
            snapshot
        }
        Ok(None) => {
            info!("No article store yet; starting empty");
            StoreSnapshot::empty()
        }
        Err(e) => {
            warn!(error = %e, "Article store unreadable; starting empty");
            StoreSnapshot::empty()
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<Option<StoreSnapshot>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }
    let raw = fs::read(path).await?;
    match serde_json::from_slice(&raw) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            if looks_truncated(&e) {
                warn!(bytes = raw.len(), "Article store looks truncated");
            }
            Err(e.into())
        }
    }
}

/// Fingerprints of everything already stored.
pub fn seen_fingerprints(articles: &[Article]) -> HashSet<String> {
    articles.iter().map(|a| a.fingerprint.clone()).collect()
}

/// Combine this cycle's articles with the prior store.
///
/// New articles go first so that, on a fingerprint clash, the new copy wins.
/// The result is sorted newest first (stable, unparseable dates last) and only
/// then cut to `limit`, so retention always drops the oldest articles.
pub fn merge(new: Vec<Article>, prior: Vec<Article>, limit: usize) -> Vec<Article> {
    let mut merged: Vec<Article> = new
        .into_iter()
        .chain(prior)
        .unique_by(|a| a.fingerprint.clone())
        .collect();
    merged.sort_by_cached_key(|a| Reverse(a.published_at()));
    merged.truncate(limit);
    merged
}
