pub mod indexer;
pub mod query;
pub mod schema;
pub mod store;

pub use indexer::FileIndexer;
pub use query::QueryBuilder;
pub use schema::FileSchema;
pub use store::IndexStore;
