// This is where the core application is wired together: configuration,
// workspace manager, and the in-process API hosts consume.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::warn;

use crate::application::config::configuration::Configuration;
use crate::application::logging::tracing::tracing_subscribe;
use crate::error::Result;
use crate::indexes::indexer::{BatchStats, CancelFlag};
use crate::indexes::query::QuerySpec;
use crate::path::PathResolver;
use crate::search::searcher::{LineSearchResults, SearchOptions, SearchResults, Searcher};
use crate::watcher::FileWatcher;
use crate::workspace::manager::WorkspaceManager;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// How often idle workspaces are swept.
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Drop every document and rescan from scratch.
    pub force_rebuild: bool,
    pub cancel: Option<CancelFlag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub workspace_id: String,
    pub document_count: u64,
    pub stats: BatchStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStats {
    pub workspace_id: String,
    pub document_count: u64,
    pub index_size_bytes: u64,
}

#[derive(Clone)]
pub struct Application {
    pub config: Arc<Configuration>,
    pub workspaces: Arc<WorkspaceManager>,
}

impl Application {
    pub async fn initialize(config: Configuration) -> Result<Self> {
        let config = Arc::new(config);
        let paths = PathResolver::new(config.base_dir.clone());
        let workspaces = Arc::new(WorkspaceManager::new(config.clone(), paths));

        let sweeper = Arc::downgrade(&workspaces);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match sweeper.upgrade() {
                    Some(workspaces) => workspaces.evict_idle().await,
                    None => break,
                }
            }
        });

        Ok(Self { config, workspaces })
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if !tracing_subscribe(config) {
            warn!("failed to install tracing subscriber; one is probably installed already");
        }

        let _ = LOGGER_INSTALLED.set(true);
    }

    /// Open or create the index for a workspace and scan it.
    pub async fn index_workspace(&self, path: &Path, options: IndexOptions) -> Result<IndexReport> {
        let workspace = self.workspaces.open_or_create(path).await?;
        if options.force_rebuild {
            workspace.store().clear().await?;
        }
        let stats = workspace
            .indexer()
            .index_workspace(options.cancel.as_ref())
            .await?;
        Ok(IndexReport {
            workspace_id: workspace.id().dir_name().to_owned(),
            document_count: workspace.store().num_docs(),
            stats,
        })
    }

    /// Document-level search over a workspace with an existing index.
    pub async fn search(
        &self,
        path: &Path,
        spec: &QuerySpec,
        options: &SearchOptions,
    ) -> Result<SearchResults> {
        let workspace = self.workspaces.open_existing(path).await?;
        let searcher = Searcher::new(workspace.store().clone());
        searcher.search(spec, options)
    }

    /// Line-level (grep-like) search.
    pub async fn search_lines(
        &self,
        path: &Path,
        spec: &QuerySpec,
        options: &SearchOptions,
    ) -> Result<LineSearchResults> {
        let workspace = self.workspaces.open_existing(path).await?;
        let searcher = Searcher::new(workspace.store().clone());
        searcher.search_lines(spec, options)
    }

    /// External change trigger; coexists with the watcher.
    pub async fn notify_file_change(&self, path: &Path, file: &Path) -> Result<BatchStats> {
        let workspace = self.workspaces.open_or_create(path).await?;
        workspace
            .indexer()
            .index_batch(&[file.to_path_buf()], None)
            .await
    }

    /// Start watching a workspace; changes flow into its indexer until
    /// the returned watcher is dropped.
    pub async fn watch_workspace(&self, path: &Path) -> Result<FileWatcher> {
        let workspace = self.workspaces.open_or_create(path).await?;
        FileWatcher::spawn(
            workspace,
            self.config.debounce(),
            self.config.watch_batch_size,
        )
    }

    /// Commit and release a workspace.
    pub async fn close_workspace(&self, path: &Path) -> Result<()> {
        self.workspaces.close(path).await
    }

    pub async fn workspace_stats(&self, path: &Path) -> Result<WorkspaceStats> {
        let workspace = self.workspaces.open_existing(path).await?;
        Ok(WorkspaceStats {
            workspace_id: workspace.id().dir_name().to_owned(),
            document_count: workspace.store().num_docs(),
            index_size_bytes: workspace.store().disk_size_bytes(),
        })
    }
}
