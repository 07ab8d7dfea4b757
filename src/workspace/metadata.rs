//! The per-workspace metadata record, maintained atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;

/// One mutex per metadata file path; writers to the same record
/// serialize, writers to different records do not.
static FILE_LOCKS: Lazy<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| std::sync::Mutex::new(HashMap::new()));

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = FILE_LOCKS.lock().unwrap();
    locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// `workspace_metadata.json`, stored next to the index segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    /// The canonical workspace path as originally opened.
    pub original_path: String,
    /// The `<basename>_<hash8>` index directory name.
    pub hash_path: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl WorkspaceMetadata {
    pub fn new(original_path: String, hash_path: String) -> Self {
        let now = Utc::now();
        Self {
            original_path,
            hash_path,
            created_at: now,
            last_accessed: now,
        }
    }

    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let lock = lock_for(path);
        let _guard = lock.lock().await;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Write temp-file-then-rename under the per-file mutex.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let lock = lock_for(path);
        let _guard = lock.lock().await;
        let serialized = serde_json::to_string_pretty(self)
            .expect("metadata serialization is infallible");
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
