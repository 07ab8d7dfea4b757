pub mod resolver;

pub use resolver::{PathResolver, WorkspaceId};
