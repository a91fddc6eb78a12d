//! Keyword rotation.
//!
//! Keywords are drawn without replacement from the part of the universe that
//! has not been used yet. Once fewer than a full batch remain, the history is
//! cleared and the rotation starts over from the whole universe.

use crate::error::{Error, Result};
use crate::models::Keyword;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use tracing::{debug, info};

/// Number of keywords interpreted per run.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Outcome of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Distinct keywords picked for this run.
    pub picked: Vec<Keyword>,
    /// Whether the history was cleared because the universe was exhausted.
    pub history_reset: bool,
}

/// Keywords of `universe` not present in `history`, in universe order.
pub fn unused_keywords<'a>(universe: &'a [Keyword], history: &[Keyword]) -> Vec<&'a Keyword> {
    let used: HashSet<&str> = history.iter().map(String::as_str).collect();
    universe
        .iter()
        .filter(|k| !used.contains(k.as_str()))
        .collect()
}

/// Pick `batch_size` distinct keywords uniformly at random.
///
/// If fewer than `batch_size` keywords are unused, `history` is cleared and
/// the batch is drawn from the whole universe. `history` is not otherwise
/// modified: callers append only the keywords whose interpretation succeeded.
///
/// `universe` is expected to hold distinct keywords, as returned by
/// [`crate::keywords::load_universe`].
///
/// # Errors
///
/// Returns [`Error::UniverseTooSmall`] if the universe cannot fill a batch,
/// and [`Error::InvalidConfig`] for a zero batch size.
pub fn select_batch<R>(
    universe: &[Keyword],
    history: &mut Vec<Keyword>,
    batch_size: usize,
    rng: &mut R,
) -> Result<Selection>
where
    R: Rng + ?Sized,
{
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be at least 1".into()));
    }
    if universe.len() < batch_size {
        return Err(Error::UniverseTooSmall {
            available: universe.len(),
            batch_size,
        });
    }

    let mut unused = unused_keywords(universe, history);
    let history_reset = unused.len() < batch_size;
    if history_reset {
        info!(
            unused = unused.len(),
            batch_size, "Not enough unused keywords; restarting rotation from the full universe"
        );
        history.clear();
        unused = universe.iter().collect();
    }
    debug!(unused = unused.len(), "Computed unused keywords");

    let picked: Vec<Keyword> = unused
        .choose_multiple(rng, batch_size)
        .map(|k| (*k).clone())
        .collect();
    info!(picked = ?picked, "Selected keywords");

    Ok(Selection {
        picked,
        history_reset,
    })
}
