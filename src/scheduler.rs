// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Concurrent per-document enrichment backed by the summary cache

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::SummaryCache;
use crate::enrichment::EnrichmentClient;
use crate::fingerprint::fingerprint_async;
use crate::reader::Document;
use crate::{Result, WizardError};

/// Summary of one file, as handed to callers and to downstream requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSummary {
    pub file_path: String,
    pub summary: String,
}

/// A path that could not be processed, and why
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedPath {
    pub path: String,
    pub reason: String,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub summaries: Vec<FileSummary>,
    pub failed: Vec<FailedPath>,
}

impl EnrichmentReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Summarized(FileSummary),
    Skipped,
    Failed(FailedPath),
    /// Aborts the whole request once every sibling has finished
    Fatal(WizardError),
}

/// Fans documents out to the enrichment client, consulting the cache first
pub struct Scheduler {
    cache: SummaryCache,
    client: Arc<EnrichmentClient>,
    strict: bool,
}

impl Scheduler {
    pub fn new(cache: SummaryCache, client: Arc<EnrichmentClient>, strict: bool) -> Self {
        Self { cache, client, strict }
    }

    /// Summarize every document concurrently and wait for all of them.
    ///
    /// One document failing never discards its siblings' results. Cache
    /// failures fail the call; enrichment failures only do so in strict mode.
    pub async fn enrich_all(&self, documents: Vec<Document>) -> Result<EnrichmentReport> {
        let total = documents.len();
        let outcomes = join_all(documents.into_iter().map(|doc| self.enrich_one(doc))).await;

        let mut report = EnrichmentReport::default();
        let mut fatal = None;
        let mut skipped = 0;

        for outcome in outcomes {
            match outcome {
                Outcome::Summarized(summary) => report.summaries.push(summary),
                Outcome::Skipped => skipped += 1,
                Outcome::Failed(failure) => report.failed.push(failure),
                Outcome::Fatal(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        info!(
            "Enriched {} of {} files ({} failed, {} skipped)",
            report.summaries.len(),
            total,
            report.failed.len(),
            skipped
        );

        if self.strict && !report.is_complete() {
            return Err(WizardError::IncompleteEnrichment(
                report.failed.into_iter().map(|f| f.path).collect(),
            ));
        }
        Ok(report)
    }

    async fn enrich_one(&self, doc: Document) -> Outcome {
        let path = doc.path().to_path_buf();
        let key = path.to_string_lossy().to_string();
        debug!("Processing file {}", key);

        let fingerprint = match fingerprint_async(path.clone()).await {
            Ok(fp) => fp,
            Err(WizardError::MissingFile(_)) => {
                warn!("Skipping {}: file vanished before it could be read", key);
                return Outcome::Skipped;
            }
            Err(e) => return Outcome::Failed(FailedPath { path: key, reason: e.to_string() }),
        };

        match self.cache.lookup(&key, &fingerprint) {
            Ok(Some(summary)) => {
                debug!("Cache hit for {}", key);
                return Outcome::Summarized(FileSummary { file_path: key, summary });
            }
            Ok(None) => {}
            Err(e) => return Outcome::Fatal(e),
        }

        let summary = match self.dispatch(&doc).await {
            Ok(summary) => summary,
            Err(WizardError::MissingFile(_)) => {
                warn!("Skipping {}: file vanished before it could be read", key);
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!("Failed to summarize {}: {}", key, e);
                return Outcome::Failed(FailedPath { path: key, reason: e.to_string() });
            }
        };

        if let Err(e) = self.cache.upsert(&key, &fingerprint, &summary) {
            return Outcome::Fatal(e);
        }
        Outcome::Summarized(FileSummary { file_path: key, summary })
    }

    async fn dispatch(&self, doc: &Document) -> Result<String> {
        match doc {
            Document::Text { text, .. } => self.client.summarize_text(text).await,
            Document::Image { path } => self.client.summarize_image(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Backoff, RetryPolicy};
    use crate::llm::mock::{request_text, ScriptedBackend};
    use std::path::{Path, PathBuf};

    fn scheduler(backend: Arc<ScriptedBackend>, cache: SummaryCache, strict: bool) -> Scheduler {
        let mut config = AppConfig::default();
        config.retry = RetryPolicy { max_attempts: 2, backoff: Backoff::None };
        let client = EnrichmentClient::new(backend.clone(), backend, &config);
        Scheduler::new(cache, Arc::new(client), strict)
    }

    fn text_doc(dir: &Path, name: &str, content: &str) -> Document {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        Document::Text { path, text: content.to_string() }
    }

    fn summarize_by_echo() -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::new(|request| {
            let text = request_text(request);
            if text.contains("CORRUPT") {
                Err(WizardError::TransientService("500".into()))
            } else {
                Ok(format!("summary of {}", text.lines().last().unwrap_or_default()))
            }
        }))
    }

    #[tokio::test]
    async fn test_second_pass_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let backend = summarize_by_echo();
        let scheduler = scheduler(backend.clone(), SummaryCache::in_memory().unwrap(), false);

        let first = scheduler.enrich_all(vec![text_doc(dir.path(), "a.txt", "alpha")]).await.unwrap();
        let second = scheduler.enrich_all(vec![text_doc(dir.path(), "a.txt", "alpha")]).await.unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_eq!(first.summaries, second.summaries);
        assert_eq!(second.summaries[0].summary, "summary of alpha");
    }

    #[tokio::test]
    async fn test_changed_content_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = summarize_by_echo();
        let cache = SummaryCache::in_memory().unwrap();
        let scheduler = scheduler(backend.clone(), cache.clone(), false);

        scheduler.enrich_all(vec![text_doc(dir.path(), "a.txt", "alpha")]).await.unwrap();
        let report = scheduler.enrich_all(vec![text_doc(dir.path(), "a.txt", "beta")]).await.unwrap();

        assert_eq!(backend.call_count(), 2);
        assert_eq!(report.summaries[0].summary, "summary of beta");
        let key = dir.path().join("a.txt").to_string_lossy().to_string();
        assert_eq!(cache.get(&key).unwrap().unwrap().summary.as_deref(), Some("summary of beta"));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_sink_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let backend = summarize_by_echo();
        let cache = SummaryCache::in_memory().unwrap();
        let scheduler = scheduler(backend.clone(), cache.clone(), false);

        let docs = vec![
            text_doc(dir.path(), "a.txt", "alpha"),
            text_doc(dir.path(), "bad.txt", "CORRUPT"),
            text_doc(dir.path(), "c.txt", "gamma"),
        ];
        let report = scheduler.enrich_all(docs).await.unwrap();

        let mut ok: Vec<String> = report.summaries.iter().map(|s| s.summary.clone()).collect();
        ok.sort();
        assert_eq!(ok, vec!["summary of alpha", "summary of gamma"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("bad.txt"));
        assert!(report.failed[0].reason.contains("2 attempts"));

        // Nothing was cached for the failed file
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(summarize_by_echo(), SummaryCache::in_memory().unwrap(), true);

        let docs = vec![text_doc(dir.path(), "a.txt", "alpha"), text_doc(dir.path(), "bad.txt", "CORRUPT")];
        match scheduler.enrich_all(docs).await {
            Err(WizardError::IncompleteEnrichment(paths)) => {
                assert_eq!(paths.len(), 1);
                assert!(paths[0].ends_with("bad.txt"));
            }
            other => panic!("expected IncompleteEnrichment, got {:?}", other.map(|r| r.summaries)),
        }
    }

    #[tokio::test]
    async fn test_vanished_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = summarize_by_echo();
        let scheduler = scheduler(backend.clone(), SummaryCache::in_memory().unwrap(), false);

        let docs = vec![
            text_doc(dir.path(), "a.txt", "alpha"),
            Document::Text { path: dir.path().join("gone.txt"), text: "ghost".into() },
            Document::Image { path: dir.path().join("gone.jpg") },
        ];
        let report = scheduler.enrich_all(docs).await.unwrap();

        assert_eq!(report.summaries.len(), 1);
        assert!(report.is_complete());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_images_go_to_the_image_channel() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        image::RgbImage::new(8, 8).save(&photo).unwrap();

        let text_backend = Arc::new(ScriptedBackend::replying("text summary"));
        let image_backend = Arc::new(ScriptedBackend::replying("a black square"));
        let config = AppConfig::default();
        let client = EnrichmentClient::new(text_backend.clone(), image_backend.clone(), &config);
        let scheduler = Scheduler::new(SummaryCache::in_memory().unwrap(), Arc::new(client), false);

        let report = scheduler
            .enrich_all(vec![Document::Image { path: PathBuf::from(&photo) }])
            .await
            .unwrap();

        assert_eq!(report.summaries[0].summary, "a black square");
        assert_eq!(text_backend.call_count(), 0);
        assert_eq!(image_backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_reported_failed() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("holiday.heic");
        std::fs::write(&photo, "not pixels").unwrap();

        let backend = Arc::new(ScriptedBackend::replying("a beach"));
        let client = EnrichmentClient::new(backend.clone(), backend.clone(), &AppConfig::default());
        let cache = SummaryCache::in_memory().unwrap();
        let scheduler = Scheduler::new(cache.clone(), Arc::new(client), false);

        let report = scheduler.enrich_all(vec![Document::Image { path: photo }]).await.unwrap();

        assert!(report.summaries.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("Unsupported image"));
        assert_eq!(backend.call_count(), 0);
        assert!(cache.is_empty().unwrap());
    }
}
