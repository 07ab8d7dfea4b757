use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Immutable configuration for the search core.
///
/// Built once at startup and passed by `Arc` into every component;
/// nothing reads configuration through a global.
#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    #[clap(long, default_value_os_t = default_base_dir())]
    #[serde(default = "default_base_dir")]
    /// Directory holding all persistent state (indexes, logs, backups)
    pub base_dir: PathBuf,

    #[clap(long, default_value_t = default_writer_buffer_bytes())]
    #[serde(default = "default_writer_buffer_bytes")]
    /// In-memory indexing buffer per workspace, in bytes
    pub writer_buffer_bytes: usize,

    #[clap(long, default_value_t = default_max_buffered_docs())]
    #[serde(default = "default_max_buffered_docs")]
    /// Documents buffered before an implicit commit
    pub max_buffered_docs: usize,

    #[clap(long, default_value_t = default_commit_interval_secs())]
    #[serde(default = "default_commit_interval_secs")]
    /// Seconds between periodic commits
    pub commit_interval_secs: u64,

    #[clap(long, default_value_t = default_lock_timeout_secs())]
    #[serde(default = "default_lock_timeout_secs")]
    /// Age in seconds after which an orphaned writer lock is reclaimed
    pub lock_timeout_secs: u64,

    #[clap(long, default_value_t = default_max_field_length())]
    #[serde(default = "default_max_field_length")]
    /// Maximum characters read from a single file
    pub max_field_length: usize,

    #[clap(long, value_delimiter = ',')]
    #[serde(default)]
    /// Extensions to index (empty means all); lowercased, with dot
    pub include_extensions: Vec<String>,

    #[clap(long, value_delimiter = ',', default_values_t = default_exclude_dirs())]
    #[serde(default = "default_exclude_dirs")]
    /// Directory basenames excluded from indexing and watching
    pub exclude_dirs: Vec<String>,

    #[clap(long, default_value_t = default_debounce_ms())]
    #[serde(default = "default_debounce_ms")]
    /// Watcher debounce window per path, in milliseconds
    pub debounce_ms: u64,

    #[clap(long, default_value_t = default_watch_batch_size())]
    #[serde(default = "default_watch_batch_size")]
    /// Maximum events dispatched to the indexer per batch
    pub watch_batch_size: usize,

    #[clap(long, default_value_t = default_context_lines())]
    #[serde(default = "default_context_lines")]
    /// Context lines returned on each side of a matching line
    pub context_lines: usize,

    #[clap(long, default_value_t = default_max_open_workspaces())]
    #[serde(default = "default_max_open_workspaces")]
    /// Open workspaces kept before LRU eviction
    pub max_open_workspaces: usize,

    #[clap(long, default_value_t = default_idle_timeout_secs())]
    #[serde(default = "default_idle_timeout_secs")]
    /// Seconds of inactivity before a workspace is evicted
    pub idle_timeout_secs: u64,

    #[clap(long, default_value_t = default_max_results())]
    #[serde(default = "default_max_results")]
    /// Default result limit forwarded to hosts
    pub max_results: usize,
}

impl Configuration {
    /// Directory where logs are written to
    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit_interval_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            writer_buffer_bytes: default_writer_buffer_bytes(),
            max_buffered_docs: default_max_buffered_docs(),
            commit_interval_secs: default_commit_interval_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            max_field_length: default_max_field_length(),
            include_extensions: Vec::new(),
            exclude_dirs: default_exclude_dirs(),
            debounce_ms: default_debounce_ms(),
            watch_batch_size: default_watch_batch_size(),
            context_lines: default_context_lines(),
            max_open_workspaces: default_max_open_workspaces(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(".codesearch"))
        .unwrap_or_else(|_| PathBuf::from(".codesearch"))
}

fn default_writer_buffer_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_max_buffered_docs() -> usize {
    1_000
}

fn default_commit_interval_secs() -> u64 {
    60
}

fn default_lock_timeout_secs() -> u64 {
    15 * 60
}

fn default_max_field_length() -> usize {
    1_000_000
}

fn default_exclude_dirs() -> Vec<String> {
    [
        "bin",
        "obj",
        "node_modules",
        ".git",
        ".vs",
        "target",
        "dist",
        "packages",
        ".codesearch",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_watch_batch_size() -> usize {
    50
}

fn default_context_lines() -> usize {
    3
}

fn default_max_open_workspaces() -> usize {
    5
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_results() -> usize {
    50
}
