//! Execute code tool: run a Python snippet in a child interpreter.
//!
//! UNSAFE: the snippet runs with the server's privileges. There is no
//! sandbox and no resource limit besides the wall-clock timeout. The tool
//! is only registered when `tools.allow_code_execution` is enabled.
//!
//! The snippet executes with an empty global scope and a separate local
//! scope. If it binds `result`, the stringified value is returned.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::ToolsConfig;
use parley_core::error::ToolError;
use parley_core::tool::Tool;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Reads the snippet from stdin and prints one JSON line as its last output.
const RUNNER: &str = r#"
import json, sys
code = sys.stdin.read()
scope = {}
try:
    exec(code, {}, scope)
    out = {"result": str(scope.get("result", "Code executed successfully"))}
except Exception as e:
    out = {"error": str(e)}
sys.stdout.write("\n" + json.dumps(out) + "\n")
"#;

pub struct ExecuteCodeTool {
    interpreter: String,
    timeout: Duration,
}

impl ExecuteCodeTool {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            config.python.clone(),
            Duration::from_secs(config.code_timeout_secs),
        )
    }

    async fn run_python(&self, code: &str) -> serde_json::Value {
        let mut child = match Command::new(&self.interpreter)
            .args(["-c", RUNNER])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.interpreter, error = %e, "Failed to start interpreter");
                return json!({ "error": format!("Failed to start {}: {e}", self.interpreter) });
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(code.as_bytes()).await {
                return json!({ "error": format!("Failed to send code: {e}") });
            }
            // stdin dropped here so the interpreter sees EOF
        }

        // Dropping the future on timeout kills the child (kill_on_drop).
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return json!({ "error": e.to_string() }),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Code execution timed out");
                return json!({
                    "error": format!("Execution timed out after {}s", self.timeout.as_secs())
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty());

        match last_line.and_then(|l| serde_json::from_str::<serde_json::Value>(l).ok()) {
            Some(value) if value.get("result").is_some() || value.get("error").is_some() => value,
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = stderr.trim().lines().last().unwrap_or("").to_string();
                debug!(status = ?output.status, "Interpreter exited without a result line");
                if reason.is_empty() {
                    json!({ "error": format!("Interpreter exited with {}", output.status) })
                } else {
                    json!({ "error": reason })
                }
            }
        }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute a Python snippet (UNSAFE, unsandboxed). The value bound to `result` is returned as a string."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Source code to run"
                },
                "language": {
                    "type": "string",
                    "description": "Only 'python' is supported",
                    "default": "python"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;
        let language = arguments["language"].as_str().unwrap_or("python");

        if language != "python" {
            return Ok(json!({ "error": format!("Language {language} not supported") }));
        }

        Ok(self.run_python(code).await)
    }
}
