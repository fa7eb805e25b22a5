// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Service surface: enrichment, reorganization proposals, search and moves
//!
//! Paths handed in and out are relative to the requested root. Cache keys
//! are absolute paths under the canonicalized root.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::SummaryCache;
use crate::enrichment::{EnrichmentClient, FileMove, SearchHit};
use crate::history::{History, MoveRecord};
use crate::mover::move_file;
use crate::planner::plan;
use crate::reader::{load_documents, ScanOptions};
use crate::reconcile::Reconciler;
use crate::scheduler::{EnrichmentReport, FailedPath, FileSummary, Scheduler};
use crate::{Result, WizardError};

/// A downstream batch that failed, with the files it carried
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedBatch {
    pub paths: Vec<String>,
    pub reason: String,
}

/// Proposed layout for a directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reorganization {
    pub files: Vec<FileMove>,
    pub failed: Vec<FailedPath>,
    pub failed_batches: Vec<FailedBatch>,
}

/// Files matching a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchReport {
    pub files: Vec<SearchHit>,
    pub failed: Vec<FailedPath>,
    pub failed_batches: Vec<FailedBatch>,
}

/// Outcome of applying a list of moves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub moved: Vec<FileMove>,
    pub failed: Vec<FailedPath>,
}

pub struct FileWizard {
    config: AppConfig,
    cache: SummaryCache,
    client: Arc<EnrichmentClient>,
    scheduler: Scheduler,
    reconciler: Reconciler,
    history: History,
}

impl FileWizard {
    /// Open the cache and build HTTP clients from configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let cache = SummaryCache::open(&config.database.path)?;
        let client = EnrichmentClient::from_config(&config)?;
        Ok(Self::new(config, cache, client))
    }

    pub fn new(config: AppConfig, cache: SummaryCache, client: EnrichmentClient) -> Self {
        let client = Arc::new(client);
        Self {
            scheduler: Scheduler::new(cache.clone(), client.clone(), config.enrichment.strict),
            reconciler: Reconciler::new(cache.clone()),
            history: History::new(PathBuf::from(&config.history_path)),
            config,
            cache,
            client,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Summarize every matching file under `root`, reusing cached summaries
    pub async fn enrich_directory(
        &self,
        root: &Path,
        recursive: bool,
        extensions: &[String],
    ) -> Result<EnrichmentReport> {
        let root = canonical_root(root).await?;
        self.enrich(&root, recursive, extensions).await
    }

    /// Ask the service for a new location for every summarized file
    pub async fn propose_reorganization(
        &self,
        root: &Path,
        recursive: bool,
        extensions: &[String],
    ) -> Result<Reorganization> {
        let root = canonical_root(root).await?;
        let report = self.enrich(&root, recursive, extensions).await?;

        let mut result = Reorganization { failed: report.failed, ..Default::default() };
        for batch in plan(report.summaries, self.config.batching.max_token_size)? {
            match self.client.propose_tree(&batch.items).await {
                Ok(moves) => result.files.extend(moves),
                Err(e) => {
                    warn!("Tree proposal failed for a batch of {} files: {}", batch.items.len(), e);
                    result.failed_batches.push(failed_batch(&batch.items, &e));
                }
            }
        }

        info!("Proposed {} moves under {:?}", result.files.len(), root);
        Ok(result)
    }

    /// Find files whose summaries match `query`
    pub async fn search(
        &self,
        root: &Path,
        recursive: bool,
        extensions: &[String],
        query: &str,
    ) -> Result<SearchReport> {
        let root = canonical_root(root).await?;
        let report = self.enrich(&root, recursive, extensions).await?;

        let mut result = SearchReport { failed: report.failed, ..Default::default() };
        for batch in plan(report.summaries, self.config.batching.max_token_size)? {
            match self.client.search(&batch.items, query).await {
                Ok(hits) => result.files.extend(hits),
                Err(e) => {
                    warn!("Search failed for a batch of {} files: {}", batch.items.len(), e);
                    result.failed_batches.push(failed_batch(&batch.items, &e));
                }
            }
        }

        info!("Search for {:?} matched {} files", query, result.files.len());
        Ok(result)
    }

    /// Move `src` to `dst` (both relative to `root`) and carry its cache row along.
    ///
    /// Returns false without touching anything when `src` is not a regular file
    /// or the paths are equal. Paths that leave `root` and occupied
    /// destinations are errors.
    pub async fn apply_move(&self, root: &Path, src: &str, dst: &str) -> Result<bool> {
        let root = canonical_root(root).await?;
        let src_path = resolve_under(&root, src)?;
        let dst_path = resolve_under(&root, dst)?;

        if src_path == dst_path {
            return Ok(false);
        }
        if !tokio::fs::metadata(&src_path).await.map(|m| m.is_file()).unwrap_or(false) {
            warn!("Not moving {:?}: not a file", src_path);
            return Ok(false);
        }

        move_file(&src_path, &dst_path).await?;
        let fingerprint = self.reconciler.record_move(&src_path, &dst_path).await?;
        self.history.append(&MoveRecord::new(&root, src, dst, fingerprint))?;

        info!("Moved {} -> {}", src, dst);
        Ok(true)
    }

    /// Apply every move, continuing past individual failures
    pub async fn apply_moves(&self, root: &Path, items: &[FileMove]) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for item in items {
            match self.apply_move(root, &item.src_path, &item.dst_path).await {
                Ok(true) => report.moved.push(item.clone()),
                Ok(false) => {}
                Err(e @ WizardError::CacheWrite(_)) => return Err(e),
                Err(e) => report.failed.push(FailedPath { path: item.src_path.clone(), reason: e.to_string() }),
            }
        }
        Ok(report)
    }

    /// Reverse the last `count` journaled moves, newest first
    pub async fn undo_moves(&self, count: usize) -> Result<Vec<MoveRecord>> {
        let mut undone = Vec::new();

        for record in self.history.get_undoable(count)? {
            let (moved_to, original) = match (
                resolve_under(&record.root, &record.dst_path),
                resolve_under(&record.root, &record.src_path),
            ) {
                (Ok(moved_to), Ok(original)) => (moved_to, original),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Cannot undo {} -> {}: {}", record.src_path, record.dst_path, e);
                    continue;
                }
            };

            if !moved_to.is_file() {
                warn!("Cannot undo {} -> {}: {:?} no longer exists", record.src_path, record.dst_path, moved_to);
                continue;
            }
            if original.exists() {
                warn!("Cannot undo {} -> {}: {:?} is occupied", record.src_path, record.dst_path, original);
                continue;
            }

            move_file(&moved_to, &original).await?;
            self.reconciler.record_move(&moved_to, &original).await?;
            self.history.mark_undone(&record.id)?;
            info!("Undid {} -> {}", record.src_path, record.dst_path);
            undone.push(record);
        }

        Ok(undone)
    }

    async fn enrich(&self, root: &Path, recursive: bool, extensions: &[String]) -> Result<EnrichmentReport> {
        self.reconciler.prune_vanished().await?;

        let options = ScanOptions::new(recursive, extensions, self.config.batching.max_document_tokens);
        let scan_root = root.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || load_documents(&scan_root, &options)).await??;
        info!("Found {} files to summarize under {:?}", documents.len(), root);

        let mut report = self.scheduler.enrich_all(documents).await?;
        for summary in &mut report.summaries {
            summary.file_path = relative_to(root, &summary.file_path);
        }
        for failure in &mut report.failed {
            failure.path = relative_to(root, &failure.path);
        }
        Ok(report)
    }
}

async fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(root).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            WizardError::NotFound(root.to_path_buf())
        } else {
            WizardError::FileSystem(e)
        }
    })?;
    if !canonical.is_dir() {
        return Err(WizardError::NotFound(root.to_path_buf()));
    }
    Ok(canonical)
}

/// Join a root-relative path, refusing anything that could land outside `root`
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    let escapes = relative.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(WizardError::UnsafePath(relative.to_string()));
    }
    Ok(root.join(path))
}

fn relative_to(root: &Path, path: &str) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn failed_batch(items: &[FileSummary], error: &WizardError) -> FailedBatch {
    FailedBatch {
        paths: items.iter().map(|s| s.file_path.clone()).collect(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backoff, RetryPolicy};
    use crate::llm::mock::{request_text, ScriptedBackend};
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        _state: TempDir,
        files: TempDir,
        wizard: FileWizard,
        text: Arc<ScriptedBackend>,
        image: Arc<ScriptedBackend>,
    }

    /// Summaries echo the last line of content; tree proposals fail for "bad"
    fn text_backend() -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::new(|request| {
            let text = request_text(request);
            if text.contains("\"dst_path\"") {
                if text.contains("summary of bad") {
                    return Err(WizardError::TransientService("503".into()));
                }
                return Ok(r#"{"files": [{"src_path": "x", "dst_path": "y"}]}"#.to_string());
            }
            if text.contains("search query") {
                return Ok(r#"{"files": [{"file": "notes.txt"}]}"#.to_string());
            }
            Ok(format!("summary of {}", text.lines().last().unwrap_or_default()))
        }))
    }

    fn fixture(max_token_size: usize) -> Fixture {
        let state = tempfile::tempdir().unwrap();
        let files = tempfile::tempdir().unwrap();

        let mut config = AppConfig::default();
        config.retry = RetryPolicy { max_attempts: 2, backoff: Backoff::None };
        config.batching.max_token_size = max_token_size;
        config.history_path = state.path().join("history.jsonl").to_string_lossy().into_owned();

        let text = text_backend();
        let image = Arc::new(ScriptedBackend::replying("a sunset over the sea"));
        let client = EnrichmentClient::new(text.clone(), image.clone(), &config);
        let wizard = FileWizard::new(config, SummaryCache::in_memory().unwrap(), client);

        Fixture { _state: state, files, wizard, text, image }
    }

    fn write_docx(path: &Path, text: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default()).unwrap();
        write!(zip, "<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text).unwrap();
        zip.finish().unwrap();
    }

    fn paths(report: &EnrichmentReport) -> Vec<&str> {
        report.summaries.iter().map(|s| s.file_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_enrichment_and_deletion() {
        let fx = fixture(4000);
        let root = fx.files.path();
        write_docx(&root.join("report.docx"), "Quarterly revenue");
        image::RgbImage::new(16, 16).save(root.join("photo.jpg")).unwrap();

        let report = fx.wizard.enrich_directory(root, false, &[]).await.unwrap();
        assert_eq!(paths(&report), vec!["photo.jpg", "report.docx"]);
        assert_eq!(report.summaries[0].summary, "a sunset over the sea");
        assert_eq!(report.summaries[1].summary, "summary of Quarterly revenue");
        assert_eq!(fx.wizard.cache().len().unwrap(), 2);

        std::fs::remove_file(root.join("photo.jpg")).unwrap();
        let report = fx.wizard.enrich_directory(root, false, &[]).await.unwrap();

        assert_eq!(paths(&report), vec!["report.docx"]);
        assert_eq!(fx.wizard.cache().len().unwrap(), 1);
        assert_eq!(fx.text.call_count(), 1);
        assert_eq!(fx.image.call_count(), 1);
    }

    #[tokio::test]
    async fn test_moved_file_keeps_summary_without_recompute() {
        let fx = fixture(4000);
        let root = fx.files.path();
        std::fs::write(root.join("notes.txt"), "standup notes").unwrap();

        fx.wizard.enrich_directory(root, true, &[]).await.unwrap();
        assert!(fx.wizard.apply_move(root, "notes.txt", "meetings/2024/standup.txt").await.unwrap());

        let report = fx.wizard.enrich_directory(root, true, &[]).await.unwrap();
        let expected = Path::new("meetings").join("2024").join("standup.txt");
        let expected = expected.to_string_lossy().into_owned();
        assert_eq!(paths(&report), vec![expected.as_str()]);
        assert_eq!(report.summaries[0].summary, "summary of standup notes");
        assert_eq!(fx.text.call_count(), 1);

        let journal = fx.wizard.history().read_all().unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].dst_path, "meetings/2024/standup.txt");
    }

    #[tokio::test]
    async fn test_apply_move_skips_missing_source() {
        let fx = fixture(4000);
        let moved = fx.wizard.apply_move(fx.files.path(), "ghost.txt", "x/ghost.txt").await.unwrap();
        assert!(!moved);
        assert!(fx.wizard.history().read_all().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_under_rejects_escapes() {
        let root = Path::new("/data/inbox");
        assert_eq!(resolve_under(root, "docs/./a.txt").unwrap(), root.join("docs").join("a.txt"));
        for bad in ["../escaped.txt", "docs/../../x", "/etc/passwd", ""] {
            assert!(matches!(resolve_under(root, bad), Err(WizardError::UnsafePath(_))), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_apply_moves_refuses_destinations_outside_root() {
        let fx = fixture(4000);
        let root = fx.files.path();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();
        std::fs::write(root.join("b.txt"), "beta").unwrap();

        let absolute = outside.path().join("stolen.txt").to_string_lossy().into_owned();
        let items = vec![
            FileMove { src_path: "a.txt".into(), dst_path: absolute },
            FileMove { src_path: "b.txt".into(), dst_path: "../escaped.txt".into() },
        ];
        let report = fx.wizard.apply_moves(root, &items).await.unwrap();

        assert!(report.moved.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(root.join("a.txt").is_file());
        assert!(root.join("b.txt").is_file());
        assert!(!outside.path().join("stolen.txt").exists());
        assert!(!root.parent().unwrap().join("escaped.txt").exists());
        assert!(fx.wizard.history().read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_colliding_destinations_keep_first_file() {
        let fx = fixture(4000);
        let root = fx.files.path();
        std::fs::write(root.join("a.txt"), "AAA").unwrap();
        std::fs::write(root.join("b.txt"), "BBB").unwrap();
        fx.wizard.enrich_directory(root, true, &[]).await.unwrap();

        let items = vec![
            FileMove { src_path: "a.txt".into(), dst_path: "docs/x.txt".into() },
            FileMove { src_path: "b.txt".into(), dst_path: "docs/x.txt".into() },
        ];
        let report = fx.wizard.apply_moves(root, &items).await.unwrap();

        assert_eq!(report.moved, items[..1].to_vec());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "b.txt");
        assert_eq!(std::fs::read_to_string(root.join("docs").join("x.txt")).unwrap(), "AAA");
        assert_eq!(std::fs::read_to_string(root.join("b.txt")).unwrap(), "BBB");
        assert_eq!(fx.wizard.cache().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_undo_restores_file_and_cache_key() {
        let fx = fixture(4000);
        let root = fx.files.path();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();
        fx.wizard.enrich_directory(root, true, &[]).await.unwrap();

        let items = vec![FileMove { src_path: "a.txt".into(), dst_path: "letters/a.txt".into() }];
        let applied = fx.wizard.apply_moves(root, &items).await.unwrap();
        assert_eq!(applied.moved, items);

        let undone = fx.wizard.undo_moves(5).await.unwrap();
        assert_eq!(undone.len(), 1);
        assert!(root.join("a.txt").is_file());
        assert!(!root.join("letters").join("a.txt").exists());

        let report = fx.wizard.enrich_directory(root, true, &[]).await.unwrap();
        assert_eq!(paths(&report), vec!["a.txt"]);
        assert_eq!(fx.text.call_count(), 1);
        assert!(fx.wizard.undo_moves(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_abort_others() {
        let fx = fixture(1);
        let root = fx.files.path();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();
        std::fs::write(root.join("b.txt"), "bad").unwrap();
        std::fs::write(root.join("c.txt"), "gamma").unwrap();

        let proposal = fx.wizard.propose_reorganization(root, false, &[]).await.unwrap();

        assert_eq!(proposal.files.len(), 2);
        assert_eq!(proposal.failed_batches.len(), 1);
        assert_eq!(proposal.failed_batches[0].paths, vec!["b.txt"]);
        assert!(proposal.failed.is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_hits() {
        let fx = fixture(4000);
        let root = fx.files.path();
        std::fs::write(root.join("notes.txt"), "standup notes").unwrap();

        let report = fx.wizard.search(root, false, &["txt".to_string()], "meeting notes").await.unwrap();
        assert_eq!(report.files, vec![SearchHit { file: "notes.txt".into() }]);
        assert!(report.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_makes_no_calls() {
        let fx = fixture(4000);
        let proposal = fx.wizard.propose_reorganization(fx.files.path(), true, &[]).await.unwrap();
        assert!(proposal.files.is_empty());
        assert_eq!(fx.text.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let fx = fixture(4000);
        let err = fx.wizard.enrich_directory(&fx.files.path().join("nope"), false, &[]).await.unwrap_err();
        assert!(matches!(err, WizardError::NotFound(_)));
    }
}
