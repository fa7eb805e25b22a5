// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Content fingerprints used to decide whether a cached summary is stale

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::{Result, WizardError};

/// Read block size
const BLOCK_SIZE: usize = 8192;

/// Hash a file's content in fixed-size blocks.
///
/// The value depends on bytes only, never on the path, and is recomputed on
/// every call.
pub fn fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| missing_or_io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; BLOCK_SIZE];

    loop {
        let read = file.read(&mut buffer).map_err(|e| missing_or_io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Same as [`fingerprint`] but on the blocking pool
pub async fn fingerprint_async(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || fingerprint(&path)).await?
}

fn missing_or_io(path: &Path, e: std::io::Error) -> WizardError {
    if e.kind() == ErrorKind::NotFound {
        WizardError::MissingFile(path.to_path_buf())
    } else {
        WizardError::FileSystem(e)
    }
}
