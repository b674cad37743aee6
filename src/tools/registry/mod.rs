//! Scalable tool registry: catalog metadata, a persisted embedding index
//! for semantic search, and a bounded dynamic cache of loaded tool objects.

mod cache;
mod catalog;
mod index;
#[allow(clippy::module_inception)]
mod registry;

pub use cache::DynamicCache;
pub use catalog::{Catalog, CatalogEntry};
pub use index::{cosine_similarity, hash_strings, EmbeddingIndex};
pub use registry::{ScoredTool, ToolRegistry};
