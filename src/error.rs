// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for FileWizard

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for FileWizard operations
pub type Result<T> = std::result::Result<T, WizardError>;

/// FileWizard error types
#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("File vanished before it could be read: {0}")]
    MissingFile(PathBuf),

    #[error("Path escapes the root directory: {0}")]
    UnsafePath(String),

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Enrichment service error: {0}")]
    TransientService(String),

    #[error("Invalid response from enrichment service: {0}")]
    InvalidServiceResponse(String),

    #[error("Enrichment unavailable after {attempts} attempts: {last_error}")]
    EnrichmentUnavailable { attempts: u32, last_error: String },

    #[error("Enrichment incomplete, {} file(s) failed", .0.len())]
    IncompleteEnrichment(Vec<String>),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WizardError {
    /// Whether a failed call to the enrichment service is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WizardError::Api(_)
                | WizardError::TransientService(_)
                | WizardError::InvalidServiceResponse(_)
                | WizardError::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WizardError::TransientService("503".into()).is_retryable());
        assert!(WizardError::InvalidServiceResponse("no json".into()).is_retryable());
        assert!(!WizardError::CacheWrite("disk full".into()).is_retryable());
        assert!(!WizardError::MissingFile(PathBuf::from("/gone")).is_retryable());
        assert!(!WizardError::UnsafePath("../etc".into()).is_retryable());
    }

    #[test]
    fn test_incomplete_message_counts_paths() {
        let err = WizardError::IncompleteEnrichment(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Enrichment incomplete, 2 file(s) failed");
    }
}
