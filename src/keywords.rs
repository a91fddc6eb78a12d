//! Keyword universe and used-keyword history files.
//!
//! Both files are JSON arrays of strings. The universe is required: a missing
//! or unreadable file ends the run. The history is best effort: a missing,
//! empty or corrupt file simply means no keyword has been used yet.

use crate::error::{Error, Result};
use crate::models::Keyword;
use itertools::Itertools;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Load the keyword universe.
///
/// Empty strings are dropped and duplicates collapsed, keeping the first
/// occurrence, so that every keyword in the returned list is distinct.
///
/// # Errors
///
/// Returns [`Error::KeywordFile`] if the file cannot be read or is not a JSON
/// array of strings.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_universe(path: &Path) -> Result<Vec<Keyword>> {
    let keyword_file_error = |reason: String| Error::KeywordFile {
        path: path.to_path_buf(),
        reason,
    };

    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| keyword_file_error(e.to_string()))?;
    let parsed: Vec<Keyword> =
        serde_json::from_str(&raw).map_err(|e| keyword_file_error(e.to_string()))?;

    let total = parsed.len();
    let universe: Vec<Keyword> = parsed
        .into_iter()
        .filter(|k| !k.is_empty())
        .unique()
        .collect();
    if universe.len() != total {
        debug!(
            listed = total,
            distinct = universe.len(),
            "Dropped empty or duplicate keywords"
        );
    }

    info!(count = universe.len(), "Loaded keyword universe");
    Ok(universe)
}

/// Load the used-keyword history, falling back to an empty history.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_history(path: &Path) -> Vec<Keyword> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No used-keyword history yet; starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read used-keyword history; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Keyword>>(&raw) {
        Ok(history) => {
            info!(count = history.len(), "Loaded used-keyword history");
            history
        }
        Err(e) => {
            warn!(error = %e, "Used-keyword history is empty or corrupt; starting empty");
            Vec::new()
        }
    }
}

/// Remove repeated keywords from the history, keeping first occurrences.
pub fn dedup_history(history: Vec<Keyword>) -> Vec<Keyword> {
    let before = history.len();
    let deduped: Vec<Keyword> = history.into_iter().unique().collect();
    if deduped.len() != before {
        debug!(
            before,
            after = deduped.len(),
            "Deduplicated used-keyword history"
        );
    }
    deduped
}

/// Serialize the history as pretty-printed JSON with non-ASCII keywords
/// written as-is.
pub fn encode_history(history: &[Keyword]) -> Result<String> {
    Ok(serde_json::to_string_pretty(history)?)
}
