// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! FileWizard: AI file summaries, reorganization proposals and search
//!
//! Summaries are cached by content fingerprint so unchanged files are never
//! sent to the enrichment service twice, and follow their files across moves.

pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod llm;
pub mod mover;
pub mod opener;
pub mod planner;
pub mod reader;
pub mod reconcile;
pub mod scheduler;
pub mod web;
pub mod wizard;

pub use config::AppConfig;
pub use error::{Result, WizardError};
pub use wizard::FileWizard;
