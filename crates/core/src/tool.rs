//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are named capabilities the client (or, transitively, the model)
//! can invoke with a JSON argument map: read/write files, list
//! directories, run code, or anything registered at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

use crate::error::ToolError;

/// A tool definition sent to clients so they know how to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Summary returned by [`ToolRegistry::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub documentation: String,
    pub is_async: bool,
}

/// The core Tool trait.
///
/// Each capability implements this trait and is registered in the
/// [`ToolRegistry`]. Results are arbitrary JSON values.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    /// Whether invocation suspends (I/O, child processes) rather than
    /// returning immediately.
    fn is_async(&self) -> bool {
        true
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type SyncCapability =
    dyn Fn(&serde_json::Value) -> std::result::Result<serde_json::Value, String> + Send + Sync;

/// A synchronous capability registered from a closure.
pub struct FnTool {
    name: String,
    description: String,
    func: Box<SyncCapability>,
}

impl FnTool {
    pub fn new<F, E>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&serde_json::Value) -> std::result::Result<serde_json::Value, E> + Send + Sync + 'static,
        E: Display,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(move |args| func(args).map_err(|e| e.to_string())),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError> {
        (self.func)(&arguments).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        })
    }
}

/// A registry of available tools, keyed by name.
///
/// Tools are registered once at startup and shared read-only afterwards.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Register a synchronous closure as a tool.
    pub fn register_fn<F, E>(&mut self, name: impl Into<String>, description: impl Into<String>, func: F)
    where
        F: Fn(&serde_json::Value) -> std::result::Result<serde_json::Value, E> + Send + Sync + 'static,
        E: Display,
    {
        self.register(Box::new(FnTool::new(name, description, func)));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }

    /// Describe a registered tool.
    pub fn describe(&self, name: &str) -> std::result::Result<ToolInfo, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let documentation = match tool.description() {
            "" => "No documentation available".to_string(),
            doc => doc.to_string(),
        };
        Ok(ToolInfo {
            name: name.to_string(),
            documentation,
            is_async: tool.is_async(),
        })
    }

    /// List all registered tool names. Order is unspecified.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
