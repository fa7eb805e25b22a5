// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Physical file relocation

use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::{Result, WizardError};

/// Move `src` to `dst`, creating parent directories as needed.
///
/// Never replaces an existing `dst`. Falls back to copy + remove when a plain
/// rename is not possible, e.g. across file systems.
pub async fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if !tokio::fs::metadata(src).await.map(|m| m.is_file()).unwrap_or(false) {
        return Err(WizardError::NotFound(src.to_path_buf()));
    }
    if src == dst {
        return Ok(());
    }
    if tokio::fs::symlink_metadata(dst).await.is_ok() {
        return Err(WizardError::DestinationExists(dst.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(src, dst).await {
        Ok(()) => {}
        Err(e) if e.kind() != ErrorKind::NotFound => {
            debug!("Rename failed ({}), copying {:?} -> {:?}", e, src, dst);
            copy_exclusive(src, dst).await?;
            tokio::fs::remove_file(src).await?;
        }
        Err(e) => return Err(e.into()),
    }

    debug!("Moved {:?} -> {:?}", src, dst);
    Ok(())
}

async fn copy_exclusive(src: &Path, dst: &Path) -> Result<()> {
    let mut reader = tokio::fs::File::open(src).await?;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => WizardError::DestinationExists(dst.to_path_buf()),
            _ => WizardError::FileSystem(e),
        })?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    Ok(())
}
