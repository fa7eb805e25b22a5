// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Hand a file to the desktop's default application

use std::path::Path;
use tracing::info;

use crate::{Result, WizardError};

/// Launch the platform opener for `path` without waiting for it
pub fn open_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(WizardError::NotFound(path.to_path_buf()));
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", ""])
            .arg(path)
            .spawn()?;
    }

    info!("Opened {:?}", path);
    Ok(())
}
