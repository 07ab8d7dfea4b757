//! A persistent, incrementally maintained full-text index over source
//! workspaces, with line-accurate search primitives for automated
//! clients.
//!
//! The library exposes an in-process API through
//! [`Application`](application::application::Application): open and scan
//! a workspace, search it at document or line granularity, feed it file
//! change notifications (or let the [`watcher`] do so), and close it.
//! Hosts bring their own RPC surface, response shaping and token
//! budgeting on top.

pub mod application;
pub mod error;
pub mod indexes;
pub mod path;
pub mod search;
pub mod tokenizer;
pub mod watcher;
pub mod workspace;

pub use application::application::{Application, IndexOptions, IndexReport, WorkspaceStats};
pub use application::config::configuration::Configuration;
pub use error::{Error, Result};
pub use indexes::indexer::{BatchStats, CancelFlag, FileIndexer, IndexRules};
pub use indexes::query::{QueryMode, QuerySpec};
pub use indexes::store::IndexStore;
pub use path::{PathResolver, WorkspaceId};
pub use search::searcher::{
    Hit, LineHit, LineSearchResults, SearchOptions, SearchResults, Searcher,
};
pub use watcher::FileWatcher;
pub use workspace::manager::WorkspaceManager;
