// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Parsing of structured replies from the enrichment service

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Result, WizardError};

/// Proposed destination for one file, both paths relative to the scanned root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMove {
    pub src_path: String,
    pub dst_path: String,
}

/// One file matched by a search query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub file: String,
}

#[derive(Deserialize)]
struct FilesEnvelope<T> {
    files: Vec<T>,
}

/// Strip prose and markdown fences around a JSON object
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = match text.find("```") {
        Some(fence) => {
            let after = &text[fence + 3..];
            // Skip an info string such as `json`
            let content = match after.find('\n') {
                Some(i) if !after[..i].contains('{') => &after[i + 1..],
                _ => after,
            };
            content.find("```").map(|end| &content[..end]).unwrap_or(content)
        }
        None => text,
    };

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Parse a `{"files": [...]}` reply, tolerating surrounding text
pub fn parse_files<T: DeserializeOwned>(reply: &str) -> Result<Vec<T>> {
    let json = extract_json_object(reply).ok_or_else(|| {
        WizardError::InvalidServiceResponse(format!("no JSON object in reply: {}", preview(reply)))
    })?;
    let envelope: FilesEnvelope<T> = serde_json::from_str(json)
        .map_err(|e| WizardError::InvalidServiceResponse(format!("{}: {}", e, preview(json))))?;
    Ok(envelope.files)
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
