use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use thiserror::Error;
use tokio::process::Command;
use utils::text::{decode_output, tail_chars};

/// How much of each output stream is echoed back to the chat.
pub const OUTPUT_TAIL_CHARS: usize = 3000;

#[derive(Debug, Error)]
pub enum CompletionWorkflowError {
    #[error("Missing script: {}", .0.display())]
    MissingScript(PathBuf),
    #[error("Failed to run completion workflow: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one run of the completion script. Output is already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResult {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl WorkflowResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn log_path(&self) -> &str {
        extract_log_path(&self.stdout)
    }

    /// Report lines describing this run, appended after the header lines.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if !self.success() {
            lines.push(format!(
                "finish: workflow start failed (exit {})",
                self.exit_code
            ));
            for (label, output) in [("stdout:", &self.stdout), ("stderr:", &self.stderr)] {
                if !output.is_empty() {
                    lines.push(String::new());
                    lines.push(label.to_string());
                    lines.push(tail_chars(output, OUTPUT_TAIL_CHARS).to_string());
                }
            }
            return lines;
        }

        let log_path = self.log_path();
        if !log_path.is_empty() {
            lines.push(format!("log: {log_path}"));
            lines.push("tip: enable takopi files, then `/file get <log>` to fetch it.".to_string());
        } else if !self.stdout.is_empty() {
            lines.push("finish: workflow started, but couldn't parse log path.".to_string());
            lines.push(String::new());
            lines.push(tail_chars(&self.stdout, OUTPUT_TAIL_CHARS).to_string());
        }
        lines
    }
}

/// Last non-blank line of the script's stdout, which names its log file.
pub fn extract_log_path(stdout: &str) -> &str {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Launches the external completion (auto-merge) script.
#[derive(Debug, Clone)]
pub struct CompletionWorkflow {
    script: PathBuf,
}

impl CompletionWorkflow {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Run `bash <script> --repo <work_dir>` inside `work_dir`.
    pub async fn launch(&self, work_dir: &Path) -> Result<WorkflowResult, CompletionWorkflowError> {
        if !tokio::fs::try_exists(&self.script).await.unwrap_or(false) {
            return Err(CompletionWorkflowError::MissingScript(self.script.clone()));
        }

        tracing::info!(
            script = %self.script.display(),
            work_dir = %work_dir.display(),
            "Starting completion workflow"
        );

        let output = Command::new("bash")
            .arg(&self.script)
            .arg("--repo")
            .arg(work_dir)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let result = WorkflowResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: decode_output(&output.stdout).trim().to_string(),
            stderr: decode_output(&output.stderr).trim().to_string(),
        };

        if result.success() {
            tracing::debug!(log = result.log_path(), "Completion workflow started");
        } else {
            tracing::warn!(
                exit_code = result.exit_code,
                "Completion workflow exited unsuccessfully"
            );
        }

        Ok(result)
    }
}
