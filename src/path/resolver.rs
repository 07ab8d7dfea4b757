//! Sole authority for on-disk paths and workspace identity.
//!
//! Nothing here creates directories; owners create what they need on
//! first use. Identity is the first 8 hex characters of SHA-256 over the
//! canonicalized workspace path, so the same workspace maps to the same
//! index directory across runs and processes.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Upper bound on accepted path lengths.
const MAX_PATH_LEN: usize = 240;

/// File name of the per-workspace metadata record.
pub const METADATA_FILE: &str = "workspace_metadata.json";

/// Index directory prefixes reserved for the memory collaborator.
/// Compared with `-` and `_` folded together, since basename
/// sanitization maps both to `_`.
const PROTECTED_PREFIXES: &[&str] = &["project_memory", "local_memory"];

/// Identity of a workspace: canonical root, hash and index directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceId {
    canonical: PathBuf,
    hash8: String,
    dir_name: String,
}

impl WorkspaceId {
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    pub fn hash8(&self) -> &str {
        &self.hash8
    }

    /// `<basename>_<hash8>`, the on-disk index directory name.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl PathResolver {
    /// `base` is `<cwd>/.codesearch` unless the configuration overrides it.
    pub fn new(base: PathBuf) -> Self {
        let mut search_roots = Vec::new();
        if let Some(home) = home_dir() {
            search_roots.push(home.join("source"));
            search_roots.push(home.join("src"));
            search_roots.push(home);
        }
        if let Ok(cwd) = std::env::current_dir() {
            search_roots.push(cwd);
        }
        Self { base, search_roots }
    }

    /// Replace the well-known roots consulted by
    /// [`try_resolve_workspace`](Self::try_resolve_workspace).
    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn index_root(&self) -> PathBuf {
        self.base.join("index")
    }

    pub fn index_path(&self, workspace: &WorkspaceId) -> PathBuf {
        self.index_root().join(workspace.dir_name())
    }

    pub fn logs_path(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn backups_path(&self, timestamp: Option<chrono::DateTime<chrono::Utc>>) -> PathBuf {
        let backups = self.base.join("backups");
        match timestamp {
            Some(ts) => backups.join(ts.format("%Y%m%d_%H%M%S").to_string()),
            None => backups,
        }
    }

    /// Metadata file for a workspace, or the global record when `None`.
    pub fn metadata_path(&self, workspace: Option<&WorkspaceId>) -> PathBuf {
        match workspace {
            Some(ws) => self.index_path(ws).join(METADATA_FILE),
            None => self.base.join(METADATA_FILE),
        }
    }

    /// Validate and canonicalize a raw workspace path into its identity.
    pub fn resolve_workspace(&self, raw: &Path) -> Result<WorkspaceId> {
        let expanded = validate_and_expand(raw)?;
        let canonical = canonicalize_lenient(&expanded);
        let hash8 = hash8_of(&canonical);
        let basename = sanitize_basename(&canonical);
        Ok(WorkspaceId {
            dir_name: format!("{basename}_{hash8}"),
            canonical,
            hash8,
        })
    }

    /// First 8 hex characters of SHA-256 over the canonical path.
    pub fn compute_workspace_hash(&self, raw: &Path) -> Result<String> {
        let expanded = validate_and_expand(raw)?;
        Ok(hash8_of(&canonicalize_lenient(&expanded)))
    }

    /// True when the index directory name is reserved for a collaborator.
    pub fn is_protected(&self, dir_name: &str) -> bool {
        let normalized = dir_name.to_lowercase().replace('-', "_");
        PROTECTED_PREFIXES
            .iter()
            .any(|prefix| normalized.starts_with(prefix))
    }

    /// Recover the original workspace path for an index directory.
    ///
    /// Prefers the metadata record. Without one, parses the directory
    /// name into `<basename>_<hash8>` and scans the well-known roots for
    /// a directory whose recomputed hash matches the suffix. Never
    /// guesses: a miss is `None`.
    pub fn try_resolve_workspace(&self, index_dir: &Path) -> Result<Option<PathBuf>> {
        let metadata_file = index_dir.join(METADATA_FILE);
        if metadata_file.exists() {
            let raw = std::fs::read_to_string(&metadata_file)?;
            if let Ok(meta) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(original) = meta.get("originalPath").and_then(|v| v.as_str()) {
                    return Ok(Some(PathBuf::from(original)));
                }
            }
        }

        let dir_name = match index_dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return Ok(None),
        };
        let Some((_, hash8)) = dir_name.rsplit_once('_') else {
            return Ok(None);
        };
        if hash8.len() != 8 || !hash8.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }

        for root in &self.search_roots {
            let entries = match std::fs::read_dir(root) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let candidate = entry.path();
                if !candidate.is_dir() {
                    continue;
                }
                let canonical = canonicalize_lenient(&candidate);
                if hash8_of(&canonical) == hash8 {
                    return Ok(Some(canonical));
                }
            }
        }
        Ok(None)
    }
}

/// Reject traversal and oversized paths; expand a leading `~`.
fn validate_and_expand(raw: &Path) -> Result<PathBuf> {
    let display = raw.to_string_lossy();
    if display.len() > MAX_PATH_LEN {
        return Err(Error::PathInvalid(format!(
            "path exceeds {MAX_PATH_LEN} characters"
        )));
    }
    if raw
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::PathInvalid("path contains `..`".to_owned()));
    }

    if let Some(rest) = display.strip_prefix("~") {
        let home = home_dir()
            .ok_or_else(|| Error::PathInvalid("cannot expand `~`: no home directory".to_owned()))?;
        let rest = rest.trim_start_matches(|c| c == '/' || c == '\\');
        return Ok(home.join(rest));
    }
    Ok(raw.to_path_buf())
}

/// Canonicalize when possible; otherwise normalize against the current
/// directory so identity stays stable for paths that do not exist yet.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Case-folded, separator-normalized form fed to the hash.
fn normalize_for_hash(path: &Path) -> String {
    path.to_string_lossy()
        .to_lowercase()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_owned()
}

fn hash8_of(canonical: &Path) -> String {
    let digest = Sha256::digest(normalize_for_hash(canonical).as_bytes());
    let hex = format!("{digest:x}");
    hex[..8].to_owned()
}

/// Final path segment, lowercased, with anything outside `[a-z0-9]`
/// replaced by `_`.
fn sanitize_basename(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "workspace".to_owned());
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "workspace".to_owned()
    } else {
        sanitized
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let var = std::env::var_os("USERPROFILE");
    #[cfg(not(windows))]
    let var = std::env::var_os("HOME");
    var.map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn resolver() -> PathResolver {
        PathResolver::new(PathBuf::from("/tmp/.codesearch"))
    }

    #[test]
    fn hash_is_stable_across_runs_and_separators() {
        let r = resolver();
        let a = r.compute_workspace_hash(Path::new("/srv/projects/demo")).unwrap();
        let b = r.compute_workspace_hash(Path::new("/srv/projects/demo")).unwrap();
        assert_eq!(a, b);

        let fwd = hash8_of(Path::new("c:/users/dev/app"));
        let back = hash8_of(Path::new("c:\\users\\dev\\app"));
        assert_eq!(fwd, back);

        let cased = hash8_of(Path::new("/srv/Projects/Demo"));
        assert_eq!(a, cased);
    }

    #[test]
    fn ten_thousand_distinct_paths_do_not_collide() {
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            let hash = hash8_of(Path::new(&format!("/srv/corpus/project_{i}")));
            assert!(seen.insert(hash), "hash collision at path {i}");
        }
    }

    #[test]
    fn traversal_and_oversized_paths_are_rejected() {
        let r = resolver();
        let err = r.resolve_workspace(Path::new("/srv/../etc")).unwrap_err();
        assert_eq!(err.discriminant(), "PathInvalid");

        let long = format!("/srv/{}", "x".repeat(MAX_PATH_LEN));
        let err = r.resolve_workspace(Path::new(&long)).unwrap_err();
        assert_eq!(err.discriminant(), "PathInvalid");
    }

    #[test]
    fn index_path_embeds_sanitized_basename_and_hash() {
        let r = resolver();
        let ws = r.resolve_workspace(Path::new("/srv/My Project.Name")).unwrap();
        assert!(ws.dir_name().starts_with("my_project_name_"));
        assert_eq!(ws.hash8().len(), 8);
        let index = r.index_path(&ws);
        assert!(index.starts_with("/tmp/.codesearch/index"));
        assert!(index.ends_with(ws.dir_name()));
    }

    #[test]
    fn protected_prefixes_are_detected() {
        let r = resolver();
        assert!(r.is_protected("project-memory_a1b2c3d4"));
        assert!(r.is_protected("local-memory_a1b2c3d4"));
        assert!(r.is_protected("project_memory_a1b2c3d4"));
        assert!(!r.is_protected("my_project_a1b2c3d4"));
    }

    #[test]
    fn resolve_prefers_the_metadata_record() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("demo_12345678");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(
            index_dir.join(METADATA_FILE),
            r#"{"originalPath":"/srv/projects/demo","hashPath":"demo_12345678"}"#,
        )
        .unwrap();

        let resolved = resolver().try_resolve_workspace(&index_dir).unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/srv/projects/demo")));
    }

    #[test]
    fn resolve_falls_back_to_scanning_known_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().join("demo");
        std::fs::create_dir_all(&workspace).unwrap();

        let r = resolver().with_search_roots(vec![tmp.path().to_path_buf()]);
        let ws = r.resolve_workspace(&workspace).unwrap();
        let index_dir = tmp.path().join(ws.dir_name());
        std::fs::create_dir_all(&index_dir).unwrap();

        let resolved = r.try_resolve_workspace(&index_dir).unwrap();
        assert_eq!(resolved, Some(ws.canonical().to_path_buf()));
    }

    #[test]
    fn resolution_miss_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("ghost_deadbeef");
        std::fs::create_dir_all(&index_dir).unwrap();

        let r = resolver().with_search_roots(vec![tmp.path().to_path_buf()]);
        assert_eq!(r.try_resolve_workspace(&index_dir).unwrap(), None);
    }
}
