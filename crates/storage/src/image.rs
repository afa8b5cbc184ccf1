// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue image persistence for crash recovery.
//!
//! The image stores the complete queue state at a point in time. Saves are
//! atomic (write to `.tmp`, fsync, rename); corrupt images are rotated to
//! a `.bak` file so a restart can still come up with an empty queue.

use chrono::{DateTime, Utc};
use eq_core::{HistoryEntry, Item};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::warn;

/// Distinguishes concurrent writers (e.g. across an event-loop restart)
/// so they never share a temp file.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur in image operations
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings blob persisted next to the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// True when an environment was open (or opening) at save time. Drives
    /// the worker re-attach window after a restart.
    #[serde(default)]
    pub environment_intent: bool,
    /// Catalogue directory the permissions were last loaded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,
}

/// The persisted queue state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueImage {
    #[serde(default)]
    pub queue: Vec<Item>,
    /// May be stale after a crash; reconciled on restart.
    #[serde(default)]
    pub running_item: Option<Item>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub settings: Settings,
    /// When this image was saved
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl QueueImage {
    pub fn new(
        queue: Vec<Item>,
        running_item: Option<Item>,
        history: Vec<HistoryEntry>,
        settings: Settings,
    ) -> Self {
        Self { queue, running_item, history, settings, saved_at: Utc::now() }
    }

    /// Save the image atomically (write to .tmp, then rename).
    ///
    /// A crash during save can never corrupt the previous image file.
    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serial = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("tmp.{}.{serial}", std::process::id()));

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;

        Ok(())
    }

    /// Load the image if it exists.
    ///
    /// Returns `Ok(None)` if the file doesn't exist or is corrupt. Corrupt
    /// images are moved to a `.bak` file so the manager can start fresh.
    pub fn load(path: &Path) -> Result<Option<Self>, ImageError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "Corrupt queue image, moving to .bak and starting fresh",
                );
                fs::rename(path, &bak_path)?;
                Ok(None)
            }
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let from = bak(n);
        if from.exists() {
            let _ = fs::rename(&from, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
