//! The `/finish` command: stop the run a message refers to and hand its
//! working directory to the completion workflow.
//!
//! Phases run in order: resolve the target directory, optionally swap the
//! main checkout for the latest scratch worktree, cancel the matching running
//! task (best effort), then launch the workflow and build the report.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;

use super::{
    cancellation::{CancelOutcome, cancel_and_await, select_cancel_target},
    completion_workflow::{CompletionWorkflow, CompletionWorkflowError},
    config::Config,
    git::DisposableWorktreeFinder,
    host::{CommandContext, CommandHost, CommandResult, HostError, RunContext},
    session::{SessionStore, extract_session_id},
    worktree::WorktreeResolver,
};

const GUIDANCE: &str = "I can't tell which repo/worktree to finish.\n\n\
                        Use one of:\n\
                        - reply to a takopi message with `/finish`\n\
                        - `/finish /<project> @<branch>`";

/// Directory the workflow will run in, plus the structured context it came
/// from (absent when a session token resolved it).
#[derive(Debug, Clone, PartialEq, Eq)]
struct FinishTarget {
    run_cwd: PathBuf,
    context: Option<RunContext>,
}

pub struct FinishCommand {
    host: Arc<dyn CommandHost>,
    resolver: WorktreeResolver,
    sessions: SessionStore,
    worktrees: DisposableWorktreeFinder,
    workflow: CompletionWorkflow,
    cancel_timeout: Duration,
}

impl FinishCommand {
    pub const ID: &'static str = "finish";
    pub const DESCRIPTION: &'static str = "cancel run and start PR auto-merge";

    /// `worktree_lock` must be shared by every resolver in the process.
    pub fn new(host: Arc<dyn CommandHost>, worktree_lock: Arc<Mutex<()>>, config: &Config) -> Self {
        Self {
            resolver: WorktreeResolver::new(host.clone(), worktree_lock),
            host,
            sessions: SessionStore::from_env(),
            worktrees: DisposableWorktreeFinder::default(),
            workflow: CompletionWorkflow::new(config.completion_script_path()),
            cancel_timeout: config.cancel_timeout(),
        }
    }

    pub fn with_session_store(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_worktree_resolver(mut self, resolver: WorktreeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[tracing::instrument(
        name = "finish",
        skip_all,
        fields(channel_id = ctx.message.channel_id, message_id = ctx.message.message_id)
    )]
    pub async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        let target = match self.resolve_target(ctx).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let mut run_cwd = target.run_cwd;

        let mut lines = Vec::new();
        let inferred = self
            .infer_worktree(target.context.as_ref(), &run_cwd)
            .await;
        if let Some((worktree, note)) = inferred {
            run_cwd = worktree;
            lines.push(note);
        }

        let cancel_note = self.cancel_running_task(ctx, target.context.as_ref()).await;

        let result = match self.workflow.launch(&run_cwd).await {
            Ok(result) => result,
            Err(CompletionWorkflowError::MissingScript(script)) => {
                return CommandResult::text(format!(
                    "Missing script: {}\nExpected from ~/dotfiles/opencode/.",
                    script.display()
                ));
            }
            Err(e) => {
                tracing::error!("Failed to launch completion workflow: {}", e);
                lines.extend(cancel_note);
                lines.push(format!(
                    "finish: could not start completion workflow in {}",
                    run_cwd.display()
                ));
                lines.push(String::new());
                lines.push(e.to_string());
                return CommandResult::text(lines.join("\n"));
            }
        };

        lines.push(format!(
            "finish: started completion workflow in {}",
            run_cwd.display()
        ));
        lines.extend(cancel_note);
        lines.extend(result.report_lines());
        CommandResult::text(lines.join("\n"))
    }

    async fn resolve_target(&self, ctx: &CommandContext) -> Result<FinishTarget, CommandResult> {
        let args_text = ctx.args_text.trim();
        let reply_text = ctx.reply_text.as_deref();

        let combined = format!("{args_text}\n{}", reply_text.unwrap_or(""));
        if let Some(session_id) = extract_session_id(&combined) {
            tracing::debug!(session_id, "Found session reference");
            if let Some(run_cwd) = self.sessions.locate_session_directory(session_id).await {
                tracing::info!(run_cwd = %run_cwd.display(), "Resolved finish target from session");
                return Ok(FinishTarget {
                    run_cwd,
                    context: None,
                });
            }
        }

        let resolved = self
            .host
            .resolve_message(args_text, reply_text, ctx.message.channel_id);

        let mut run_cwd = None;
        if let Some(context) = resolved.context.as_ref() {
            run_cwd = self
                .resolver
                .resolve_with_retry(context)
                .await
                .map_err(|e| lookup_failed(&e))?;
        }

        match run_cwd {
            Some(run_cwd) => {
                tracing::info!(run_cwd = %run_cwd.display(), "Resolved finish target from context");
                Ok(FinishTarget {
                    run_cwd,
                    context: resolved.context,
                })
            }
            None => Err(CommandResult::text(GUIDANCE)),
        }
    }

    /// Replace the main checkout with the newest scratch worktree when the user
    /// named a project but no branch.
    async fn infer_worktree(
        &self,
        context: Option<&RunContext>,
        run_cwd: &Path,
    ) -> Option<(PathBuf, String)> {
        let context = context?;
        if context.explicit_branch().is_some() {
            return None;
        }
        let project_key = context.project_key()?;

        let project_root = match self
            .resolver
            .resolve_with_retry(&RunContext::for_project(&project_key))
            .await
        {
            Ok(root) => root?,
            Err(e) => {
                tracing::warn!("Could not resolve root of project {}: {}", project_key, e);
                return None;
            }
        };
        if project_root != run_cwd {
            return None;
        }

        let latest = self
            .worktrees
            .latest_disposable_worktree(&project_root)
            .await?;
        tracing::info!(
            project = %project_key,
            branch = %latest.branch,
            worktree = %latest.path.display(),
            "Inferred finish worktree"
        );
        let note = format!(
            "finish: inferred worktree `{}` @ `{}`",
            project_key, latest.branch
        );
        Some((latest.path, note))
    }

    async fn cancel_running_task(
        &self,
        ctx: &CommandContext,
        context: Option<&RunContext>,
    ) -> Option<String> {
        let running_tasks = ctx.running_tasks.as_ref()?;
        let (message, task) = select_cancel_target(
            ctx.reply_to.as_ref(),
            ctx.message.channel_id,
            context,
            running_tasks,
        )?;

        tracing::info!(target_message = message.message_id, "Cancelling running task");
        let detail = match cancel_and_await(&task, self.cancel_timeout).await {
            CancelOutcome::Cancelled => {
                format!("(cancelled run from message {})", message.message_id)
            }
            CancelOutcome::TimedOut => {
                tracing::warn!(
                    target_message = message.message_id,
                    "Running task did not stop in time"
                );
                format!(
                    "(timed out after {}s; continuing anyway)",
                    self.cancel_timeout.as_secs()
                )
            }
        };
        Some(format!("finish: cancel requested {detail}"))
    }
}

fn lookup_failed(error: &HostError) -> CommandResult {
    let message = error.to_string();
    let message = match message.trim() {
        "" => "unknown error",
        trimmed => trimmed,
    };
    CommandResult::text(format!(
        "Worktree lookup failed.\n\n{message}\n\n\
         Tip: wait a few seconds and try again. If it persists, restart the Takopi launch agent."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_failed_message() {
        let reply = lookup_failed(&HostError::Resolution("  no such branch  ".into()));
        assert!(reply.text.starts_with("Worktree lookup failed.\n\nno such branch\n\n"));
        assert!(reply.text.contains("Tip: wait a few seconds"));
    }

    #[test]
    fn test_lookup_failed_empty_message() {
        let reply = lookup_failed(&HostError::Resolution(String::new()));
        assert!(reply.text.contains("\n\nunknown error\n\n"));
    }

    #[test]
    fn test_guidance_lists_both_forms() {
        assert!(GUIDANCE.contains("reply to a takopi message with `/finish`"));
        assert!(GUIDANCE.contains("`/finish /<project> @<branch>`"));
    }
}
