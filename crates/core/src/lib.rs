//! # MoltyClaw Core
//!
//! Domain types, traits, and error definitions for the MoltyClaw agent runtime.
//! This crate has **no framework dependencies**: it defines the conversation
//! model, the provider streaming contract, the action protocol and the memory
//! interface that every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: role-tagged turns and the conversation log
//! - [`provider`]: the streaming backend trait
//! - [`action`]: commands, action handlers, external tool sources and the registry
//! - [`memory`]: the long-term / daily memory collaborator
//! - [`event`]: domain events over a broadcast bus

pub mod action;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use action::{ActionHandler, ActionRegistry, Command, ExternalTool, ExternalToolSource};
pub use error::{ActionError, Error, MemoryError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryHit, MemoryStore};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, StreamChunk, Usage};
