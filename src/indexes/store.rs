//! Per-workspace inverted index: segmented writer, near-real-time
//! reader, commit discipline and lock recovery.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tantivy::directory::MmapDirectory;
use tantivy::schema::Document;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, Term};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::indexes::schema::FileSchema;
use crate::tokenizer::register_tokenizers;

/// tantivy's writer lock file inside the index directory. A crashed
/// process leaves it behind; see [`IndexStore::create_writer`].
const WRITER_LOCK_FILE: &str = ".tantivy-writer.lock";

pub struct IndexStoreOptions {
    pub writer_buffer_bytes: usize,
    pub max_buffered_docs: usize,
    pub lock_timeout: Duration,
}

impl Default for IndexStoreOptions {
    fn default() -> Self {
        Self {
            writer_buffer_bytes: 256 * 1024 * 1024,
            max_buffered_docs: 1_000,
            lock_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// One workspace's index. At most one writer exists per store; readers
/// hold point-in-time snapshots and never block writes.
pub struct IndexStore {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    schema: FileSchema,
    dir: PathBuf,
    options: IndexStoreOptions,
    pending_docs: AtomicUsize,
}

impl IndexStore {
    /// Open or create the index at `dir` and register the analyzers
    /// before the first reader is built.
    pub fn open_or_create(dir: &Path, options: IndexStoreOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let schema = FileSchema::new();
        let mmap = MmapDirectory::open(dir)
            .map_err(|err| Error::IndexUnavailable(err.to_string()))?;
        let index = Index::open_or_create(mmap, schema.schema.clone())?;
        register_tokenizers(&index);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommit)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            schema,
            dir: dir.to_path_buf(),
            options,
            pending_docs: AtomicUsize::new(0),
        })
    }

    pub fn schema(&self) -> &FileSchema {
        &self.schema
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// A consistent point-in-time snapshot. Queries in flight keep their
    /// snapshot even while commits land or the workspace is evicted.
    pub fn acquire_searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Total size of the index segments on disk.
    pub fn disk_size_bytes(&self) -> u64 {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Replace the document for `path` (delete-by-path then add, one
    /// commit unit). Commits implicitly once enough documents buffered.
    pub async fn add_or_replace(&self, path: &str, document: Document) -> Result<()> {
        let mut guard = self.writer_guard().await?;
        let writer = guard.as_mut().unwrap();
        writer.delete_term(Term::from_field_text(self.schema.path, path));
        writer.add_document(document)?;
        drop(guard);

        let pending = self.pending_docs.fetch_add(1, Ordering::Relaxed) + 1;
        if pending >= self.options.max_buffered_docs {
            self.commit().await?;
        }
        Ok(())
    }

    /// Delete the document for `path`, if any.
    pub async fn delete_by_path(&self, path: &str) -> Result<()> {
        let mut guard = self.writer_guard().await?;
        let writer = guard.as_mut().unwrap();
        writer.delete_term(Term::from_field_text(self.schema.path, path));
        self.pending_docs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove every document. Used by forced rebuilds.
    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.writer_guard().await?;
        let writer = guard.as_mut().unwrap();
        writer.delete_all_documents()?;
        drop(guard);
        self.commit().await
    }

    /// Make buffered changes visible to new reader snapshots.
    pub async fn commit(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            writer.commit()?;
        }
        drop(guard);
        self.pending_docs.store(0, Ordering::Relaxed);
        self.reader.reload()?;
        Ok(())
    }

    /// Commit and release the writer, waiting for background merges.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            writer.commit()?;
            writer.wait_merging_threads()?;
        }
        drop(guard);
        self.pending_docs.store(0, Ordering::Relaxed);
        self.reader.reload()?;
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending_docs.load(Ordering::Relaxed) > 0
    }

    async fn writer_guard(&self) -> Result<MutexGuard<'_, Option<IndexWriter>>> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            let id: u64 = rand::random();
            debug!(id, dir = ?self.dir, "creating index writer");
            *guard = Some(self.create_writer()?);
        }
        Ok(guard)
    }

    /// Create the writer, reclaiming a stale lock once.
    ///
    /// tantivy holds an advisory lock on a lock file in the index
    /// directory. Acquisition failure means some writer still holds it;
    /// when the lock file is older than the configured timeout that
    /// holder is assumed dead or wedged, the file is removed and
    /// acquisition retried once. Anything else is contention the caller
    /// may retry.
    fn create_writer(&self) -> Result<IndexWriter> {
        match self.index.writer(self.options.writer_buffer_bytes) {
            Ok(writer) => Ok(writer),
            Err(tantivy::TantivyError::LockFailure(lock_err, msg)) => {
                let lock_path = self.dir.join(WRITER_LOCK_FILE);
                if self.lock_is_stale(&lock_path) {
                    warn!(?lock_path, "reclaiming stale writer lock");
                    std::fs::remove_file(&lock_path)?;
                    return self
                        .index
                        .writer(self.options.writer_buffer_bytes)
                        .map_err(Into::into);
                }
                Err(Error::from(tantivy::TantivyError::LockFailure(lock_err, msg)))
            }
            Err(other) => Err(other.into()),
        }
    }

    fn lock_is_stale(&self, lock_path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(lock_path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match modified.elapsed() {
            Ok(age) => age >= self.options.lock_timeout,
            Err(_) => false,
        }
    }
}

/// Periodic commit loop; aborted by the owner on eviction.
pub fn spawn_periodic_commit(
    store: std::sync::Arc<IndexStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !store.has_pending() {
                continue;
            }
            if let Err(err) = store.commit().await {
                warn!(%err, "periodic commit failed");
            }
        }
    })
}
