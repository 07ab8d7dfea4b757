//! File to document pipeline: include/exclude rules, binary rejection,
//! capped reads, and batch indexing with per-file error capture.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tantivy::doc;
use tantivy::schema::Document;
use tracing::{debug, info, warn};

use crate::application::config::configuration::Configuration;
use crate::error::{Error, Result};
use crate::indexes::store::IndexStore;

/// Cooperative cancellation flag shared with the caller.
pub type CancelFlag = Arc<AtomicBool>;

/// Include/exclude rules applied before any file is read.
#[derive(Debug, Clone, Default)]
pub struct IndexRules {
    /// Allowed extensions, lowercased with dot. Empty allows all.
    pub include_extensions: Vec<String>,
    /// Denied directory basenames. Deny wins over include.
    pub exclude_dirs: Vec<String>,
    /// Maximum characters read from a single file.
    pub max_field_length: usize,
}

impl IndexRules {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            include_extensions: config
                .include_extensions
                .iter()
                .map(|ext| {
                    let ext = ext.to_lowercase();
                    if ext.starts_with('.') {
                        ext
                    } else {
                        format!(".{ext}")
                    }
                })
                .collect(),
            exclude_dirs: config.exclude_dirs.clone(),
            max_field_length: config.max_field_length,
        }
    }

    /// True when `path` (under `root`) passes both lists.
    pub fn allows(&self, root: &Path, path: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            let denied = relative.components().any(|component| {
                let name = component.as_os_str().to_string_lossy();
                self.exclude_dirs.iter().any(|deny| deny.as_str() == name)
            });
            if denied {
                return false;
            }
        }
        if self.include_extensions.is_empty() {
            return true;
        }
        let ext = extension_of(path);
        self.include_extensions.iter().any(|allow| *allow == ext)
    }

    /// Whether a directory subtree should be descended into at all.
    pub fn allows_dir_name(&self, name: &str) -> bool {
        !self.exclude_dirs.iter().any(|deny| deny == name)
    }
}

/// Outcome for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { capped: bool },
    Deleted,
    Skipped,
}

/// Aggregated outcome of a batch. Per-file failures never abort the
/// batch; commit failures do.
#[derive(Debug, Default, Serialize)]
pub struct BatchStats {
    pub added: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Files indexed with truncated content (`ReadCapped`).
    pub capped: Vec<PathBuf>,
    /// Per-file failures as `(path, discriminant: message)`.
    pub failed: Vec<(PathBuf, String)>,
    /// Files not reached because the batch was canceled.
    pub outstanding: Vec<PathBuf>,
    pub canceled: bool,
    pub duration_ms: u64,
}

impl BatchStats {
    fn record(&mut self, path: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Indexed { capped } => {
                self.added += 1;
                if capped {
                    self.capped.push(path.to_path_buf());
                }
            }
            FileOutcome::Deleted => self.deleted += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Turns files of one workspace into index documents.
pub struct FileIndexer {
    store: Arc<IndexStore>,
    workspace_root: PathBuf,
    rules: IndexRules,
}

impl FileIndexer {
    pub fn new(store: Arc<IndexStore>, workspace_root: PathBuf, rules: IndexRules) -> Self {
        Self {
            store,
            workspace_root,
            rules,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn rules(&self) -> &IndexRules {
        &self.rules
    }

    /// Index, replace or delete the document for a single file.
    pub async fn index_file(&self, path: &Path) -> Result<FileOutcome> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        let path_str = path.to_string_lossy().to_string();

        if !path.is_file() || !self.rules.allows(&self.workspace_root, &path) {
            self.store.delete_by_path(&path_str).await?;
            return Ok(FileOutcome::Deleted);
        }

        let payload = match read_capped(&path, self.rules.max_field_length)? {
            Some(payload) => payload,
            None => {
                // Binary content: make sure no stale document survives.
                self.store.delete_by_path(&path_str).await?;
                return Ok(FileOutcome::Skipped);
            }
        };

        let capped = payload.capped;
        let document = self.build_document(&path, &payload);
        self.store.add_or_replace(&path_str, document).await?;
        debug!(path = %path.display(), capped, "indexed file");
        Ok(FileOutcome::Indexed { capped })
    }

    /// Index a batch of files and commit at the end. Per-file errors are
    /// collected; a commit error aborts the batch.
    pub async fn index_batch(&self, paths: &[PathBuf], cancel: Option<&CancelFlag>) -> Result<BatchStats> {
        let start = Instant::now();
        let mut stats = BatchStats::default();

        for (i, path) in paths.iter().enumerate() {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    stats.canceled = true;
                    stats.outstanding = paths[i..].to_vec();
                    break;
                }
            }
            match self.index_file(path).await {
                Ok(outcome) => stats.record(path, outcome),
                Err(err) => {
                    warn!(%err, path = %path.display(), "indexing failed; skipping");
                    stats
                        .failed
                        .push((path.clone(), format!("{}: {err}", err.discriminant())));
                }
            }
        }

        self.store.commit().await?;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Walk the whole workspace and index every allowed file.
    ///
    /// File reads fan out through rayon; document writes funnel through
    /// the single store writer.
    pub async fn index_workspace(&self, cancel: Option<&CancelFlag>) -> Result<BatchStats> {
        let start = Instant::now();
        let files = tokio::task::block_in_place(|| self.collect_files());
        info!(
            workspace = %self.workspace_root.display(),
            files = files.len(),
            "starting workspace scan"
        );

        let rules = self.rules.clone();
        let payloads: Vec<(PathBuf, Result<Option<FilePayload>>)> =
            tokio::task::block_in_place(|| {
                use rayon::prelude::*;
                files
                    .into_par_iter()
                    .map(|path| {
                        let payload = read_capped(&path, rules.max_field_length);
                        (path, payload)
                    })
                    .collect()
            });

        let mut stats = BatchStats::default();
        let mut outstanding_from = None;
        for (i, (path, payload)) in payloads.iter().enumerate() {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    stats.canceled = true;
                    outstanding_from = Some(i);
                    break;
                }
            }
            let path_str = path.to_string_lossy().to_string();
            match payload {
                Ok(Some(payload)) => {
                    let document = self.build_document(path, payload);
                    match self.store.add_or_replace(&path_str, document).await {
                        Ok(()) => stats.record(path, FileOutcome::Indexed { capped: payload.capped }),
                        Err(err) => stats
                            .failed
                            .push((path.clone(), format!("{}: {err}", err.discriminant()))),
                    }
                }
                Ok(None) => stats.record(path, FileOutcome::Skipped),
                Err(err) => stats
                    .failed
                    .push((path.clone(), format!("{}: {err}", err.discriminant()))),
            }
        }
        if let Some(from) = outstanding_from {
            stats.outstanding = payloads[from..].iter().map(|(p, _)| p.clone()).collect();
        }

        self.store.commit().await?;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            workspace = %self.workspace_root.display(),
            added = stats.added,
            skipped = stats.skipped,
            failed = stats.failed.len(),
            took_ms = stats.duration_ms,
            "workspace scan finished"
        );
        Ok(stats)
    }

    /// Allowed files under the workspace root. Deny-listed directories
    /// are pruned before descent.
    fn collect_files(&self) -> Vec<PathBuf> {
        let rules = self.rules.clone();
        let walker = ignore::WalkBuilder::new(&self.workspace_root)
            .standard_filters(true)
            .hidden(false)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                rules.allows_dir_name(&name)
            })
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .map(|entry| entry.into_path())
            .filter(|path| self.rules.allows(&self.workspace_root, path))
            .collect()
    }

    fn build_document(&self, path: &Path, payload: &FilePayload) -> Document {
        let schema = self.store.schema();

        let relative = path
            .strip_prefix(&self.workspace_root)
            .unwrap_or(path)
            .to_path_buf();
        let relative_str = slashed(&relative);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let relative_directory = relative
            .parent()
            .map(slashed)
            .unwrap_or_default();
        let directory_name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let line_count = payload.content.matches('\n').count() as u64 + 1;

        doc!(
            schema.path => path.to_string_lossy().as_ref(),
            schema.relative_path => relative_str,
            schema.filename => filename.as_str(),
            schema.filename_lower => filename.to_lowercase(),
            schema.extension => extension_of(path),
            schema.directory => directory,
            schema.relative_directory => relative_directory,
            schema.directory_name => directory_name,
            schema.size => payload.size as i64,
            schema.modified => payload.modified,
            schema.line_count => line_count,
            schema.content => payload.content.as_str(),
            schema.content_symbols => payload.content.as_str(),
            schema.content_patterns => payload.content.as_str(),
        )
    }
}

struct FilePayload {
    content: String,
    capped: bool,
    size: u64,
    modified: i64,
}

/// Lowercased extension including the dot, or empty.
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn slashed(path: &Path) -> String {
    let s = path.to_string_lossy().to_string();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s
    }
}

/// Read a file up to `max_chars`. Returns `None` for binary content
/// (NUL byte within the first 8 KiB).
fn read_capped(path: &Path, max_chars: usize) -> Result<Option<FilePayload>> {
    let metadata = std::fs::metadata(path)?;
    let bytes = std::fs::read(path)?;

    let probe = &bytes[..bytes.len().min(8 * 1024)];
    if probe.contains(&0) {
        return Ok(None);
    }

    let mut content = String::from_utf8_lossy(&bytes).into_owned();
    let mut capped = false;
    if let Some((idx, _)) = content.char_indices().nth(max_chars) {
        content.truncate(idx);
        capped = true;
    }
    if capped {
        warn!(
            path = %path.display(),
            max_chars,
            "{}",
            Error::ReadCapped {
                path: path.to_path_buf(),
                indexed_chars: max_chars
            }
        );
    }

    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        });

    Ok(Some(FilePayload {
        content,
        capped,
        size: metadata.len(),
        modified,
    }))
}
