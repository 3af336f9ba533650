//! Conversation memory for parley.
//!
//! The [`ContextStore`] is the append-only exchange log plus the auxiliary
//! context map, with best-effort JSON snapshots to disk.

pub mod context_store;

pub use context_store::{ContextStore, Snapshot};
