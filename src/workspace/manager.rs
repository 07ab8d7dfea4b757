//! Bounded cache of open workspaces: LRU plus idle-timeout eviction,
//! protected-path refusal, and exactly one writer per workspace.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::config::configuration::Configuration;
use crate::error::{Error, Result};
use crate::indexes::indexer::{FileIndexer, IndexRules};
use crate::indexes::store::{spawn_periodic_commit, IndexStore, IndexStoreOptions};
use crate::path::{PathResolver, WorkspaceId};
use crate::workspace::metadata::WorkspaceMetadata;

/// `lastAccessed` is rewritten at most this often per workspace.
const METADATA_REFRESH: Duration = Duration::from_secs(60);

/// One open workspace: its store, its indexer, and bookkeeping for
/// eviction and metadata refresh.
pub struct OpenWorkspace {
    id: WorkspaceId,
    store: Arc<IndexStore>,
    indexer: FileIndexer,
    metadata_path: PathBuf,
    last_used: std::sync::Mutex<Instant>,
    metadata_refreshed: std::sync::Mutex<Instant>,
    committer: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for OpenWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWorkspace").field("id", &self.id).finish()
    }
}

impl OpenWorkspace {
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn indexer(&self) -> &FileIndexer {
        &self.indexer
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }

    /// Rewrite `lastAccessed`, throttled to once per minute.
    async fn maybe_refresh_metadata(&self) {
        {
            let mut refreshed = self.metadata_refreshed.lock().unwrap();
            if refreshed.elapsed() < METADATA_REFRESH {
                return;
            }
            *refreshed = Instant::now();
        }
        if let Ok(Some(mut meta)) = WorkspaceMetadata::load(&self.metadata_path).await {
            meta.last_accessed = Utc::now();
            if let Err(err) = meta.save(&self.metadata_path).await {
                warn!(%err, "failed to refresh workspace metadata");
            }
        }
    }
}

/// Tracks open workspaces. Cold opens go through here so that any
/// workspace has at most one writer process-wide.
pub struct WorkspaceManager {
    config: Arc<Configuration>,
    paths: PathResolver,
    open: Mutex<LruCache<WorkspaceId, Arc<OpenWorkspace>>>,
}

impl WorkspaceManager {
    pub fn new(config: Arc<Configuration>, paths: PathResolver) -> Self {
        let capacity = NonZeroUsize::new(config.max_open_workspaces.max(1))
            .expect("capacity is at least one");
        Self {
            config,
            paths,
            open: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Open a workspace, creating its index when absent.
    pub async fn open_or_create(&self, raw: &Path) -> Result<Arc<OpenWorkspace>> {
        self.open_inner(raw, true).await
    }

    /// Open a workspace that must already have an index on disk.
    pub async fn open_existing(&self, raw: &Path) -> Result<Arc<OpenWorkspace>> {
        self.open_inner(raw, false).await
    }

    async fn open_inner(&self, raw: &Path, create: bool) -> Result<Arc<OpenWorkspace>> {
        let id = self.paths.resolve_workspace(raw)?;
        self.refuse_protected(&id)?;

        let mut cache = self.open.lock().await;
        if let Some(existing) = cache.get(&id) {
            let existing = existing.clone();
            drop(cache);
            existing.touch();
            existing.maybe_refresh_metadata().await;
            return Ok(existing);
        }

        let index_dir = self.paths.index_path(&id);
        if !create && !index_dir.join("meta.json").exists() {
            return Err(Error::WorkspaceUnknown(id.canonical().to_path_buf()));
        }

        let options = IndexStoreOptions {
            writer_buffer_bytes: self.config.writer_buffer_bytes,
            max_buffered_docs: self.config.max_buffered_docs,
            lock_timeout: self.config.lock_timeout(),
        };
        let store = Arc::new(IndexStore::open_or_create(&index_dir, options)?);
        let indexer = FileIndexer::new(
            store.clone(),
            id.canonical().to_path_buf(),
            IndexRules::from_config(&self.config),
        );

        let metadata_path = self.paths.metadata_path(Some(&id));
        let mut metadata = WorkspaceMetadata::load(&metadata_path)
            .await?
            .unwrap_or_else(|| {
                WorkspaceMetadata::new(
                    id.canonical().to_string_lossy().to_string(),
                    id.dir_name().to_owned(),
                )
            });
        metadata.last_accessed = Utc::now();
        metadata.save(&metadata_path).await?;

        let committer = spawn_periodic_commit(store.clone(), self.config.commit_interval());
        let workspace = Arc::new(OpenWorkspace {
            id: id.clone(),
            store,
            indexer,
            metadata_path,
            last_used: std::sync::Mutex::new(Instant::now()),
            metadata_refreshed: std::sync::Mutex::new(Instant::now()),
            committer,
        });

        info!(workspace = %id.canonical().display(), dir = id.dir_name(), "opened workspace");
        if let Some((evicted_id, evicted)) = cache.push(id, workspace.clone()) {
            drop(cache);
            debug!(dir = evicted_id.dir_name(), "evicting workspace over capacity");
            Self::shutdown(evicted).await;
        }
        Ok(workspace)
    }

    /// Commit, close and forget a workspace.
    pub async fn close(&self, raw: &Path) -> Result<()> {
        let id = self.paths.resolve_workspace(raw)?;
        let evicted = self.open.lock().await.pop(&id);
        match evicted {
            Some(workspace) => {
                Self::shutdown(workspace).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Close every open workspace (process shutdown).
    pub async fn close_all(&self) {
        let mut cache = self.open.lock().await;
        while let Some((_, workspace)) = cache.pop_lru() {
            Self::shutdown(workspace).await;
        }
    }

    /// Evict workspaces idle past the configured timeout.
    pub async fn evict_idle(&self) {
        let idle_timeout = self.config.idle_timeout();
        let mut cache = self.open.lock().await;
        let stale: Vec<WorkspaceId> = cache
            .iter()
            .filter(|(_, ws)| ws.idle_for() >= idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(workspace) = cache.pop(&id) {
                info!(dir = id.dir_name(), "evicting idle workspace");
                Self::shutdown(workspace).await;
            }
        }
    }

    /// Number of currently open workspaces.
    pub async fn open_count(&self) -> usize {
        self.open.lock().await.len()
    }

    fn refuse_protected(&self, id: &WorkspaceId) -> Result<()> {
        let basename = id
            .canonical()
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.paths.is_protected(id.dir_name()) || self.paths.is_protected(&basename) {
            return Err(Error::ProtectedPath(id.dir_name().to_owned()));
        }
        Ok(())
    }

    /// Eviction never invalidates a live reader: the store is behind an
    /// `Arc` and in-flight snapshots stay valid; only the writer closes.
    async fn shutdown(workspace: Arc<OpenWorkspace>) {
        workspace.committer.abort();
        if let Err(err) = workspace.store.close().await {
            warn!(%err, dir = workspace.id.dir_name(), "closing workspace failed");
        }
        if let Ok(Some(mut meta)) = WorkspaceMetadata::load(&workspace.metadata_path).await {
            meta.last_accessed = Utc::now();
            let _ = meta.save(&workspace.metadata_path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolver::METADATA_FILE;

    fn manager_in(tmp: &tempfile::TempDir, max_open: usize) -> WorkspaceManager {
        let config = Arc::new(Configuration {
            base_dir: tmp.path().join(".codesearch"),
            max_open_workspaces: max_open,
            ..Configuration::default()
        });
        let paths = PathResolver::new(config.base_dir.clone());
        WorkspaceManager::new(config, paths)
    }

    fn workspace_dir(tmp: &tempfile::TempDir, name: &str) -> PathBuf {
        let dir = tmp.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn opening_creates_index_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 5);
        let ws_dir = workspace_dir(&tmp, "demo");

        let workspace = manager.open_or_create(&ws_dir).await.unwrap();
        let index_dir = manager.paths().index_path(workspace.id());
        assert!(index_dir.join("meta.json").exists());
        assert!(index_dir.join(METADATA_FILE).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_opens_share_one_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 5);
        let ws_dir = workspace_dir(&tmp, "demo");

        let a = manager.open_or_create(&ws_dir).await.unwrap();
        let b = manager.open_or_create(&ws_dir).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.open_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lru_overflow_evicts_the_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 1);

        let first = workspace_dir(&tmp, "first");
        let second = workspace_dir(&tmp, "second");
        manager.open_or_create(&first).await.unwrap();
        manager.open_or_create(&second).await.unwrap();

        assert_eq!(manager.open_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_workspace_is_not_created_on_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 5);
        let ws_dir = workspace_dir(&tmp, "demo");

        let err = manager.open_existing(&ws_dir).await.unwrap_err();
        assert_eq!(err.discriminant(), "WorkspaceUnknown");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn protected_names_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 5);

        for name in ["project-memory", "local-memory"] {
            let ws_dir = workspace_dir(&tmp, name);
            let err = manager.open_or_create(&ws_dir).await.unwrap_err();
            assert_eq!(err.discriminant(), "ProtectedPath");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_drops_the_workspace_from_the_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 5);
        let ws_dir = workspace_dir(&tmp, "demo");

        manager.open_or_create(&ws_dir).await.unwrap();
        manager.close(&ws_dir).await.unwrap();
        assert_eq!(manager.open_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eviction_keeps_live_snapshots_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_in(&tmp, 1);
        let ws_dir = workspace_dir(&tmp, "demo");
        std::fs::write(ws_dir.join("a.rs"), "fn alpha() {}\n").unwrap();

        let workspace = manager.open_or_create(&ws_dir).await.unwrap();
        workspace.indexer().index_workspace(None).await.unwrap();
        let snapshot = workspace.store().acquire_searcher();
        let docs_before = snapshot.num_docs();

        // Force an eviction by opening a second workspace.
        let other = workspace_dir(&tmp, "other");
        manager.open_or_create(&other).await.unwrap();

        assert_eq!(snapshot.num_docs(), docs_before);
    }
}
