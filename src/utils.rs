//! Utility functions for logging, output staging and run locking.
//!
//! This module provides helpers used throughout the pipeline:
//! - String truncation for log previews of generated text
//! - Directory preparation for output files
//! - Staged writes: every output is written next to its target first and
//!   renamed into place only once all outputs have been written
//! - A lock file that keeps two runs from racing on the same history

use crate::error::{Error, Result};
use std::fs as stdfs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and a byte
/// count indicator appended. Counting characters rather than bytes keeps the
/// cut on a UTF-8 boundary for Korean text.
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

/// Create the parent directory of `path` if it does not exist yet.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e)),
        _ => Ok(()),
    }
}

/// Sibling path an output is written to before it is renamed into place.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// An output written to its staging path, waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
}

impl StagedFile {
    /// Write `contents` to the staging path next to `target`.
    #[instrument(level = "debug", skip_all, fields(path = %target.display()))]
    pub async fn write(target: &Path, contents: &[u8]) -> Result<Self> {
        ensure_parent_dir(target).await?;
        let staging = staging_path(target);
        fs::write(&staging, contents)
            .await
            .map_err(|e| Error::io(&staging, e))?;
        debug!(staging = %staging.display(), bytes = contents.len(), "Staged output");
        Ok(Self {
            target: target.to_path_buf(),
            staging,
        })
    }

    /// Rename the staged file over its target.
    ///
    /// On failure the staged file is removed and the target is left as it was.
    pub async fn commit(self) -> Result<()> {
        if let Err(e) = fs::rename(&self.staging, &self.target).await {
            let err = Error::io(&self.target, e);
            self.discard().await;
            return Err(err);
        }
        info!(path = %self.target.display(), "Wrote output");
        Ok(())
    }

    /// Remove the staged file without touching the target.
    pub async fn discard(self) {
        if let Err(e) = fs::remove_file(&self.staging).await {
            warn!(path = %self.staging.display(), error = %e, "Failed to remove staged output");
        }
    }
}

/// Stage every `(target, contents)` pair, then rename them into place in order.
///
/// If any staging write fails, the outputs staged so far are discarded and
/// no target is modified. Renames happen only after every write succeeded,
/// so the window in which targets disagree is limited to the renames. A
/// failed rename stops the commit and discards the outputs not yet renamed.
pub async fn write_all_staged(outputs: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged = Vec::with_capacity(outputs.len());
    for (target, contents) in outputs {
        match StagedFile::write(target, contents).await {
            Ok(file) => staged.push(file),
            Err(e) => {
                for file in staged {
                    file.discard().await;
                }
                return Err(e);
            }
        }
    }
    let mut pending = staged.into_iter();
    while let Some(file) = pending.next() {
        if let Err(e) = file.commit().await {
            for file in pending {
                file.discard().await;
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Exclusive lock held for the duration of a run.
///
/// The lock is a file created with create-new semantics that holds the
/// process id. It is removed when the guard is dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Lock path guarding `history_path`.
    pub fn path_for(history_path: &Path) -> PathBuf {
        let mut name = history_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        history_path.with_file_name(name)
    }

    /// Acquire the lock, failing with [`Error::AlreadyRunning`] if it is held.
    pub fn acquire(path: &Path) -> Result<Self> {
        match stdfs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                // The pid is informational only.
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "Acquired run lock");
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::AlreadyRunning(path.to_path_buf()))
            }
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = stdfs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
