// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Directory scanning: turns a root into documents ready for enrichment

pub mod extract;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{Result, WizardError};

/// Extensions sent to the vision model instead of the text model
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "heic", "heif", "avif",
];

/// A file ready for enrichment; consumed once per pass
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// Extracted (and possibly truncated) text
    Text { path: PathBuf, text: String },
    /// Image read lazily when it is summarized
    Image { path: PathBuf },
}

impl Document {
    pub fn path(&self) -> &Path {
        match self {
            Document::Text { path, .. } | Document::Image { path } => path,
        }
    }
}

/// Scan options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Accepted extensions, lowercase without the dot; empty accepts everything
    pub extensions: HashSet<String>,
    /// Text beyond this many approximate tokens is cut
    pub max_document_tokens: usize,
}

impl ScanOptions {
    pub fn new(recursive: bool, extensions: &[String], max_document_tokens: usize) -> Self {
        Self {
            recursive,
            extensions: extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            max_document_tokens,
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Split a `pdf;docx;.txt` style list
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}

/// Collect documents under `root`.
///
/// Files that cannot be read are skipped with a warning rather than failing
/// the scan. Blocking; call from the blocking pool in async contexts.
pub fn load_documents(root: &Path, options: &ScanOptions) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(WizardError::NotFound(root.to_path_buf()));
    }

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !should_process(path) || !options.accepts(path) {
            continue;
        }

        if is_image(path) {
            documents.push(Document::Image { path: path.to_path_buf() });
            continue;
        }

        match extract::extract_text(path) {
            Ok(text) if text.trim().is_empty() => {
                warn!("Skipping {:?}: no text content", path);
            }
            Ok(text) => {
                let text = extract::truncate_to_tokens(text, options.max_document_tokens);
                documents.push(Document::Text { path: path.to_path_buf(), text });
            }
            Err(e) => {
                warn!("Error reading file {:?}: {}", path, e);
            }
        }
    }

    debug!("Loaded {} documents from {:?}", documents.len(), root);
    Ok(documents)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Skip temporary downloads and OS metadata files
fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    let skip_names = ["desktop.ini", "thumbs.db"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}
