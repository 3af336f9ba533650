//! List files tool: directory entries, sorted by name.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::Tool;

pub struct ListFilesTool;

async fn entries(directory: &str) -> std::io::Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(directory).await?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (defaults to the current directory)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to list",
                    "default": "."
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let directory = arguments["directory"].as_str().unwrap_or(".");

        match entries(directory).await {
            Ok(names) => Ok(serde_json::json!(names)),
            Err(e) => Ok(serde_json::Value::String(format!("Error listing files: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = ListFilesTool
            .execute(serde_json::json!({ "directory": dir.path().to_str().unwrap() }))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(["a.txt", "b.txt", "sub"]));
    }

    #[tokio::test]
    async fn defaults_to_current_directory() {
        let result = ListFilesTool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.is_array());
    }

    #[tokio::test]
    async fn failure_is_reported_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let result = ListFilesTool
            .execute(serde_json::json!({ "directory": missing.to_str().unwrap() }))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().starts_with("Error listing files:"));
    }
}
