//! Read file tool: return a file's contents as text.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::Tool;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let text = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => format!("Error reading file: {e}"),
        };
        Ok(serde_json::Value::String(text))
    }
}
