//! Shell command execution in the session workspace.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::traits::{Tool, ToolContext, ToolResult};

/// Executes shell commands via `sh -c` with the session's workspace as
/// the working directory.  The hard deadline is enforced by the
/// dispatcher; sandboxing is the execution container's concern.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command. Use for: git, npm, pip, python, system ops."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?;

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.cwd)
            .output()
            .await
            .map_err(|e| format!("failed to spawn process: {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let combined = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("STDERR: {stderr}")
        } else {
            format!("{stdout}\nSTDERR: {stderr}")
        };

        if output.status.success() {
            Ok(ToolResult::ok(if combined.is_empty() {
                "(no output)".to_owned()
            } else {
                combined
            }))
        } else {
            Ok(ToolResult::err(format!(
                "exit code {}: {combined}",
                output.status.code().unwrap_or(-1)
            )))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_in_session_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), 1, 1);

        let result = RunCommandTool
            .execute(json!({"command": "pwd"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        // Account for symlinked temp dirs (macOS /private prefix).
        assert!(result.output.trim().ends_with(
            dir.path().file_name().unwrap().to_str().unwrap()
        ));
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), 1, 1);

        let result = RunCommandTool
            .execute(json!({"command": "echo oops >&2; exit 3"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.contains("exit code 3"));
        assert!(result.error.contains("oops"));
    }

    #[tokio::test]
    async fn missing_command_is_an_arg_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), 1, 1);
        let err = RunCommandTool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(err.contains("command"));
    }
}
