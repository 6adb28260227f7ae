//! In-memory collaborators for tests, tooling, and single-node use.

pub mod cache;
pub mod object_store;

pub use cache::MemCache;
pub use object_store::MemObjectStore;
