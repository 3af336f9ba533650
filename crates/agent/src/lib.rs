//! The agent orchestration and streaming pipeline for parley.
//!
//! A message moves through three stages:
//!
//! 1. **Record** the input in the session's context store
//! 2. **Generate** a reply through the [`CompletionDriver`], either
//!    blocking or as a stream of [`Fragment`]s
//! 3. **Finalize** by storing the response on the recorded exchange
//!
//! Transports call [`Agent::process`] or [`Agent::process_stream`] and
//! decide how to render errors to their clients.

pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_support;

pub use driver::{CompletionDriver, Fragment, FragmentReceiver, build_messages, render_error};
pub use error::AgentError;
pub use orchestrator::{Agent, DEFAULT_CONTEXT_WINDOW};
pub use prompt::DEFAULT_SYSTEM_PROMPT;
