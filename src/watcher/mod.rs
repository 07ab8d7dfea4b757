//! Filesystem watching: debounced, deny-filtered, batched dispatch to
//! the indexer.
//!
//! The watcher never indexes by itself. Debounced events funnel through
//! a channel into one ordered dispatch task per workspace, which hands
//! batches to the [`FileIndexer`]; existence at dispatch time decides
//! between add/replace and delete, so coalesced create+delete pairs and
//! decomposed moves come out right without event-kind bookkeeping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::workspace::OpenWorkspace;

/// A live watch on one workspace root. Dropping it stops both the OS
/// watch and the dispatch task.
pub struct FileWatcher {
    // Held for its Drop: unwatches the root.
    _debouncer: Debouncer<RecommendedWatcher>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl FileWatcher {
    /// Watch the workspace root recursively and dispatch changed paths
    /// to its indexer in batches of at most `batch_size`.
    pub fn spawn(
        workspace: Arc<OpenWorkspace>,
        debounce: Duration,
        batch_size: usize,
    ) -> Result<Self> {
        let (tx, rx) = flume::unbounded::<Vec<PathBuf>>();

        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let paths = events.into_iter().map(|event| event.path).collect();
                    let _ = tx.send(paths);
                }
                Err(err) => warn!(%err, "file watch error"),
            }
        })
        .map_err(watch_error)?;

        let root = workspace.indexer().workspace_root().to_path_buf();
        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        let dispatcher = tokio::spawn(dispatch_loop(workspace, rx, batch_size));

        Ok(Self {
            _debouncer: debouncer,
            dispatcher,
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_loop(
    workspace: Arc<OpenWorkspace>,
    rx: flume::Receiver<Vec<PathBuf>>,
    batch_size: usize,
) {
    let root = workspace.indexer().workspace_root().to_path_buf();
    while let Ok(paths) = rx.recv_async().await {
        // Deny-listed subtrees are filtered out before delivery; the
        // indexer applies the include rules on top.
        let mut batch: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| {
                let Ok(relative) = path.strip_prefix(&root) else {
                    return false;
                };
                relative.components().all(|component| {
                    workspace
                        .indexer()
                        .rules()
                        .allows_dir_name(&component.as_os_str().to_string_lossy())
                })
            })
            .collect();
        batch.sort();
        batch.dedup();
        if batch.is_empty() {
            continue;
        }

        for chunk in batch.chunks(batch_size.max(1)) {
            match workspace.indexer().index_batch(chunk, None).await {
                Ok(stats) => debug!(
                    added = stats.added,
                    deleted = stats.deleted,
                    skipped = stats.skipped,
                    failed = stats.failed.len(),
                    "watch batch indexed"
                ),
                Err(err) => warn!(%err, "watch batch failed"),
            }
        }
    }
}

fn watch_error(err: notify_debouncer_mini::notify::Error) -> Error {
    Error::PersistenceFailure {
        source: std::io::Error::new(std::io::ErrorKind::Other, err),
    }
}
