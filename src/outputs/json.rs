//! JSON output of the article store.
//!
//! The snapshot is the single source of truth between cycles and is also
//! served verbatim to the site's browser script:
//!
//! ```json
//! { "generated": "2024-01-01T00:15:00.000Z", "articles": [ { "id": "...", "siteUrl": "..." } ] }
//! ```

use super::write_atomic;
use crate::error::Result;
use crate::models::StoreSnapshot;
use std::path::Path;
use tracing::{info, instrument};

/// Serialize `snapshot` and atomically replace the file at `path`.
///
/// # Errors
///
/// Fails if serialization, the temp write, or the rename fails. The previous
/// snapshot is left untouched in that case.
#[instrument(level = "info", skip_all, fields(path = %path.display(), articles = snapshot.articles.len()))]
pub async fn write_snapshot(snapshot: &StoreSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    write_atomic(path, &json).await?;
    info!(bytes = json.len(), "Wrote article store");
    Ok(())
}
