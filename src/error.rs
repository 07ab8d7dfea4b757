use std::path::PathBuf;

/// Errors surfaced by the search core.
///
/// Each variant maps to one stable discriminant (see [`Error::discriminant`])
/// that hosts can match on without parsing messages.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("path failed validation: {0}")]
    PathInvalid(String),

    #[error("no index exists for workspace {}", .0.display())]
    WorkspaceUnknown(PathBuf),

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("writer lock contested beyond recovery: {0}")]
    LockUnavailable(String),

    #[error("persistence failure")]
    PersistenceFailure {
        #[from]
        source: std::io::Error,
    },

    #[error("query could not be parsed in the requested mode: {0}")]
    QueryMalformed(String),

    #[error("workspace name is reserved: {0}")]
    ProtectedPath(String),

    #[error("operation canceled")]
    Canceled,

    #[error("file exceeded the maximum field length: {}", .path.display())]
    ReadCapped { path: PathBuf, indexed_chars: usize },
}

impl Error {
    /// Stable discriminant for host-side dispatch.
    pub fn discriminant(&self) -> &'static str {
        match self {
            Error::PathInvalid(_) => "PathInvalid",
            Error::WorkspaceUnknown(_) => "WorkspaceUnknown",
            Error::IndexUnavailable(_) => "IndexUnavailable",
            Error::LockUnavailable(_) => "LockUnavailable",
            Error::PersistenceFailure { .. } => "PersistenceFailure",
            Error::QueryMalformed(_) => "QueryMalformed",
            Error::ProtectedPath(_) => "ProtectedPath",
            Error::Canceled => "Canceled",
            Error::ReadCapped { .. } => "ReadCapped",
        }
    }
}

impl From<tantivy::TantivyError> for Error {
    fn from(err: tantivy::TantivyError) -> Self {
        match err {
            tantivy::TantivyError::LockFailure(lock, msg) => Error::LockUnavailable(format!(
                "{lock}{}",
                msg.map(|m| format!(": {m}")).unwrap_or_default()
            )),
            tantivy::TantivyError::IoError(io) => Error::IndexUnavailable(io.to_string()),
            other => Error::IndexUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
