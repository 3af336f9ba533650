//! # parley core
//!
//! Domain types, traits, and error definitions for the parley
//! conversational orchestration layer. This crate defines the domain model
//! that all other crates implement against.
//!
//! Every external collaborator (LLM backend, tool capability) is a trait
//! here. Implementations live in their respective crates, which keeps
//! them swappable and easy to stub in tests.

pub mod error;
pub mod exchange;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, ProviderError, ToolError};
pub use exchange::{ContextMap, Exchange, ExchangeHandle};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{FnTool, Tool, ToolDefinition, ToolInfo, ToolRegistry};
