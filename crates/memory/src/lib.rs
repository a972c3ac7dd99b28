//! Memory store implementations for MoltyClaw.

pub mod in_memory;
pub mod markdown;
mod scan;

pub use in_memory::InMemoryStore;
pub use markdown::MarkdownMemory;
