// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Keeps the cache's key set in line with the file system

use std::path::Path;
use tracing::{debug, info};

use crate::db::SummaryCache;
use crate::fingerprint::fingerprint_async;
use crate::Result;

pub struct Reconciler {
    cache: SummaryCache,
}

impl Reconciler {
    pub fn new(cache: SummaryCache) -> Self {
        Self { cache }
    }

    /// Drop rows for files that no longer exist on disk.
    ///
    /// Only rows seen missing are deleted, and each is checked again under the
    /// cache lock, so rows upserted while this runs are left alone.
    pub async fn prune_vanished(&self) -> Result<Vec<String>> {
        let cached = self.cache.all_paths()?;
        let cache = self.cache.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let vanished: Vec<String> = cached.into_iter().filter(|p| !Path::new(p).is_file()).collect();
            if vanished.is_empty() {
                return Ok(Vec::new());
            }
            debug!("{} cached paths look vanished", vanished.len());
            cache.remove_missing(&vanished)
        })
        .await??;

        if !removed.is_empty() {
            info!("Pruned {} cache entries for deleted files", removed.len());
        }
        Ok(removed)
    }

    /// Follow a completed move so the summary survives without recomputation.
    ///
    /// Returns the moved file's fingerprint.
    pub async fn record_move(&self, old_path: &Path, new_path: &Path) -> Result<String> {
        let fingerprint = fingerprint_async(new_path.to_path_buf()).await?;
        let moved = self.cache.rename(
            &old_path.to_string_lossy(),
            &new_path.to_string_lossy(),
            &fingerprint,
        )?;
        if !moved {
            debug!("No cache row for {:?}, nothing to re-key", old_path);
        }
        Ok(fingerprint)
    }
}
