use std::path::PathBuf;

use async_trait::async_trait;
use services::services::{
    config::Config,
    git::GitCli,
    host::{ChannelId, CommandHost, HostError, ResolvedMessage, RunContext},
};

use crate::directives::{Directives, parse_context_footer, parse_directives};

/// Host backed by the `projects` table of the config file.
///
/// Worktrees are only looked up, never created: a branch resolves to the
/// worktree that has it checked out.
pub struct LocalHost {
    config: Config,
    git: GitCli,
}

impl LocalHost {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            git: GitCli::new(),
        }
    }

    fn context_from(&self, directives: Directives) -> Option<RunContext> {
        let project = directives.project?;
        let Some(key) = self.config.project_key(&project) else {
            tracing::debug!("Ignoring unknown project {}", project);
            return None;
        };
        Some(RunContext::new(Some(key), directives.branch))
    }
}

#[async_trait]
impl CommandHost for LocalHost {
    fn resolve_message(
        &self,
        text: &str,
        reply_text: Option<&str>,
        _channel_id: ChannelId,
    ) -> ResolvedMessage {
        let mut directives = parse_directives(text);
        if directives.is_empty()
            && let Some(footer) = reply_text.and_then(parse_context_footer)
        {
            directives = footer;
        }
        ResolvedMessage {
            context: self.context_from(directives),
        }
    }

    async fn resolve_run_cwd(&self, context: &RunContext) -> Result<Option<PathBuf>, HostError> {
        let Some(project) = context.project.as_deref() else {
            return Ok(None);
        };
        let root = self
            .config
            .project_path(project)
            .ok_or_else(|| HostError::Resolution(format!("unknown project `{project}`")))?;

        let Some(branch) = context.explicit_branch() else {
            if root.is_dir() {
                return Ok(Some(root));
            }
            return Err(HostError::Resolution(format!(
                "project `{project}` checkout {} does not exist",
                root.display()
            )));
        };

        let worktrees = self
            .git
            .list_worktrees(&root)
            .await
            .map_err(|e| HostError::Resolution(e.to_string()))?;
        worktrees
            .into_iter()
            .find(|worktree| worktree.branch == branch)
            .map(|worktree| Some(worktree.path))
            .ok_or_else(|| {
                HostError::Resolution(format!(
                    "branch `{branch}` has no worktree in project `{project}`"
                ))
            })
    }
}
