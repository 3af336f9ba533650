//! LLM provider implementations for parley.
//!
//! All providers implement the `parley_core::Provider` trait. The only
//! backend shipped is the OpenAI-compatible chat completions client.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
