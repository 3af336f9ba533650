//! Write file tool: create or overwrite a file, creating parent
//! directories as needed.

use std::path::Path;

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::Tool;
use tracing::debug;

pub struct WriteFileTool;

async fn write(path: &str, content: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and any missing parent directories, overwrites if it exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let text = match write(path, content).await {
            Ok(()) => {
                debug!(path, bytes = content.len(), "File written");
                format!("File written successfully: {path}")
            }
            Err(e) => format!("Error writing file: {e}"),
        };
        Ok(serde_json::Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_new_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a").join("b").join("out.txt");
        let path = file_path.to_str().unwrap();

        let result = WriteFileTool
            .execute(serde_json::json!({ "path": path, "content": "payload" }))
            .await
            .unwrap();

        assert_eq!(result, format!("File written successfully: {path}"));
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "payload");
    }

    #[tokio::test]
    async fn failure_is_reported_as_text() {
        let dir = tempfile::tempdir().unwrap();
        // The directory itself is not a writable file
        let result = WriteFileTool
            .execute(serde_json::json!({ "path": dir.path().to_str().unwrap(), "content": "x" }))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().starts_with("Error writing file:"));
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let result = WriteFileTool
            .execute(serde_json::json!({ "path": "/tmp/whatever.txt" }))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
