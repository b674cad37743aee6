//! External collaborators the core consumes but does not implement in full:
//! the LLM completion provider and the embeddings provider. Each is a small
//! trait plus one production-shaped implementation and one deterministic
//! stub for offline/test use.

pub mod embeddings;
pub mod llm;

pub use embeddings::EmbeddingsProvider;
pub use llm::LlmProvider;
