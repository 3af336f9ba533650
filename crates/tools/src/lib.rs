//! Built-in tool implementations for parley.
//!
//! Tools give the assistant access to the local workspace: read, write
//! and list files, and (behind an explicit opt-in) run Python snippets.

pub mod execute_code;
pub mod file_read;
pub mod file_write;
pub mod list_files;

use parley_config::ToolsConfig;
use parley_core::tool::ToolRegistry;

pub use execute_code::ExecuteCodeTool;
pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use list_files::ListFilesTool;

/// Create a tool registry with the built-in tools.
///
/// `execute_code` runs arbitrary code with the server's privileges and is
/// only registered when `allow_code_execution` is set.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(ListFilesTool));

    if config.allow_code_execution {
        tracing::warn!("Unsandboxed code execution tool enabled");
        registry.register(Box::new(ExecuteCodeTool::from_config(config)));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn code_execution_is_opt_in() {
        let registry = default_registry(&ToolsConfig::default());
        let names: HashSet<&str> = registry.names().into_iter().collect();
        assert_eq!(names, HashSet::from(["read_file", "write_file", "list_files"]));

        let config = ToolsConfig {
            allow_code_execution: true,
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        assert!(registry.get("execute_code").is_some());
        assert_eq!(registry.len(), 4);
    }
}
