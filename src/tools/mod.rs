//! Tool system: a uniform `Tool` trait, a handful of built-in tools, and a
//! scalable registry that indexes and caches them for semantic lookup.

pub mod builtin;
pub mod registry;
pub mod traits;

pub use traits::{BreakerPolicy, Field, FieldKind, ObjectSchema, RetryPolicy, Tool};

/// URL / form-encoding helper shared by tools that build query strings.
pub(crate) mod urlencoding {
    pub fn encode(s: &str) -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
    }
}
