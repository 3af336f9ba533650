//! Agent orchestrator: the per-message lifecycle.
//!
//! Both entry points follow the same three steps:
//!
//! 1. **Record** the input in the context store (no response yet)
//! 2. **Generate** with the window that precedes the new exchange
//! 3. **Finalize**: a blocking turn stores its response; a streamed turn
//!    forwards fragments as they arrive and stores the concatenated text
//!    only when stream persistence is enabled
//!
//! Tool listing and execution delegate to the registry and never touch
//! conversation state.

use std::path::Path;
use std::sync::Arc;

use parley_config::AppConfig;
use parley_core::error::ToolError;
use parley_core::exchange::{ContextMap, ExchangeHandle};
use parley_core::tool::{ToolInfo, ToolRegistry};
use parley_memory::ContextStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{CompletionDriver, Fragment, FragmentReceiver};
use crate::error::AgentError;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;

/// Default number of prior exchanges included in a prompt.
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Combines the context store, completion driver and tool registry.
pub struct Agent {
    driver: Arc<CompletionDriver>,
    tools: Arc<ToolRegistry>,
    store: Arc<ContextStore>,
    system_prompt: Arc<str>,
    context_window: usize,
    persist_streamed: bool,
}

impl Agent {
    pub fn new(driver: CompletionDriver, tools: ToolRegistry) -> Self {
        Self {
            driver: Arc::new(driver),
            tools: Arc::new(tools),
            store: Arc::new(ContextStore::new()),
            system_prompt: Arc::from(DEFAULT_SYSTEM_PROMPT),
            context_window: DEFAULT_CONTEXT_WINDOW,
            persist_streamed: false,
        }
    }

    /// Build from application config.
    pub fn from_config(driver: CompletionDriver, tools: ToolRegistry, config: &AppConfig) -> Self {
        let mut agent = Self::new(driver, tools)
            .with_context_window(config.agent.context_window)
            .with_stream_persistence(config.agent.persist_streamed_responses);
        if let Some(prompt) = &config.agent.system_prompt {
            agent = agent.with_system_prompt(prompt.as_str());
        }
        agent
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt: String = prompt.into();
        self.system_prompt = Arc::from(prompt);
        self
    }

    pub fn with_context_window(mut self, limit: usize) -> Self {
        self.context_window = limit;
        self
    }

    /// Record the concatenated fragments of a streamed turn as its response.
    pub fn with_stream_persistence(mut self, enabled: bool) -> Self {
        self.persist_streamed = enabled;
        self
    }

    /// Use an existing store instead of a fresh one.
    pub fn with_store(mut self, store: Arc<ContextStore>) -> Self {
        self.store = store;
        self
    }

    /// A new session sharing this agent's driver and tools, with its own
    /// empty context store.
    pub fn fork_session(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            tools: Arc::clone(&self.tools),
            store: Arc::new(ContextStore::new()),
            system_prompt: Arc::clone(&self.system_prompt),
            context_window: self.context_window,
            persist_streamed: self.persist_streamed,
        }
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn driver(&self) -> &CompletionDriver {
        &self.driver
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn record(&self, input: &str, context: ContextMap) -> (ExchangeHandle, Vec<parley_core::Exchange>) {
        let handle = self.store.append(input, context);
        let window = self.store.window_before(&handle, self.context_window);
        debug!(handle = %handle, window = window.len(), "Exchange recorded");
        (handle, window)
    }

    /// Process one message to completion.
    pub async fn process(&self, input: &str, context: ContextMap) -> Result<String, AgentError> {
        self.process_with_cancel(input, context, &CancellationToken::new())
            .await
    }

    /// Process one message to completion, giving up when `cancel` fires.
    ///
    /// On failure the exchange stays recorded without a response.
    pub async fn process_with_cancel(
        &self,
        input: &str,
        context: ContextMap,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let (handle, window) = self.record(input, context);

        let response = self
            .driver
            .complete(input, &window, &self.system_prompt, cancel)
            .await?;

        self.store.set_response(&handle, response.as_str())?;
        info!(handle = %handle, chars = response.len(), "Turn completed");
        Ok(response)
    }

    /// Process one message as a sequence of fragments.
    pub fn process_stream(&self, input: &str, context: ContextMap) -> FragmentReceiver {
        self.process_stream_with_cancel(input, context, CancellationToken::new())
    }

    /// Process one message as a sequence of fragments, stopping when
    /// `cancel` fires.
    pub fn process_stream_with_cancel(
        &self,
        input: &str,
        context: ContextMap,
        cancel: CancellationToken,
    ) -> FragmentReceiver {
        let (handle, window) = self.record(input, context);
        let upstream = self
            .driver
            .stream(input, &window, &self.system_prompt, cancel);

        if !self.persist_streamed {
            return upstream;
        }

        relay_and_persist(upstream, Arc::clone(&self.store), handle)
    }

    /// Invoke a registered tool.
    pub async fn execute_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        debug!(tool = %name, "Executing tool");
        self.tools.execute(name, arguments).await
    }

    /// Names of all registered tools, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.names().into_iter().map(String::from).collect();
        names.sort();
        names
    }

    pub fn describe_tool(&self, name: &str) -> Result<ToolInfo, ToolError> {
        self.tools.describe(name)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Snapshot the conversation to `path`.
    pub fn save_state(&self, path: &Path) -> Result<(), AgentError> {
        self.store.save_to(path)?;
        Ok(())
    }

    /// Restore the conversation from `path`. Missing or corrupt state
    /// leaves the store as it was.
    pub fn load_state(&self, path: &Path) -> bool {
        self.store.load_from(path)
    }
}

/// Forward fragments unchanged and, if the stream finishes cleanly, record
/// their concatenation as the exchange's response.
fn relay_and_persist(
    mut upstream: FragmentReceiver,
    store: Arc<ContextStore>,
    handle: ExchangeHandle,
) -> FragmentReceiver {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut text = String::new();
        let mut failed = false;

        while let Some(fragment) = upstream.recv().await {
            match &fragment {
                Fragment::Text(t) => text.push_str(t),
                Fragment::Error(_) => failed = true,
            }
            if tx.send(fragment).await.is_err() {
                debug!(handle = %handle, "Stream consumer went away, response not recorded");
                return;
            }
        }

        if failed {
            return;
        }

        if let Err(e) = store.set_response(&handle, text) {
            warn!(handle = %handle, error = %e, "Failed to record streamed response");
        }
    });

    rx
}
