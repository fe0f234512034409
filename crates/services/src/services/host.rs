//! Types shared with the chat host that invokes `/finish`.
//!
//! The host owns message delivery, directive parsing, directory resolution and
//! the registry of running tasks. The finish flow only reads these values and
//! raises signals on them.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type ChannelId = i64;
pub type MessageId = i64;

/// Identifies a chat message; used as the key of the running-task registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

/// Structured target of a run: a project key and optionally a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RunContext {
    pub project: Option<String>,
    pub branch: Option<String>,
}

impl RunContext {
    pub fn new(project: Option<String>, branch: Option<String>) -> Self {
        Self { project, branch }
    }

    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            branch: None,
        }
    }

    /// Lowercased project key, `None` when the project is absent or empty.
    pub fn project_key(&self) -> Option<String> {
        self.project
            .as_deref()
            .filter(|project| !project.is_empty())
            .map(str::to_lowercase)
    }

    /// Branch named explicitly by the user, ignoring blank values.
    pub fn explicit_branch(&self) -> Option<&str> {
        self.branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
    }
}

/// Result of asking the host to interpret command and reply text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub context: Option<RunContext>,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    Resolution(String),
}

/// Operations the finish flow consumes from its host.
#[async_trait]
pub trait CommandHost: Send + Sync {
    /// Interpret free text (and the replied-to text) as a run context.
    fn resolve_message(
        &self,
        text: &str,
        reply_text: Option<&str>,
        channel_id: ChannelId,
    ) -> ResolvedMessage;

    /// Map a run context to the directory the run operates in.
    async fn resolve_run_cwd(&self, context: &RunContext) -> Result<Option<PathBuf>, HostError>;
}

/// A one-shot event. Once set it stays set; waiters are released immediately.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    token: CancellationToken,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

/// An in-flight automated run tracked by the host.
#[derive(Debug, Default)]
pub struct RunningTask {
    pub context: Option<RunContext>,
    /// Raised by whoever wants the run to stop; observed by the run itself.
    pub cancel_requested: Signal,
    /// Raised by the run when it has stopped.
    pub done: Signal,
}

impl RunningTask {
    pub fn new(context: Option<RunContext>) -> Self {
        Self {
            context,
            cancel_requested: Signal::new(),
            done: Signal::new(),
        }
    }
}

/// Registry of running tasks keyed by the message that started them.
///
/// `insert` and `remove` are for the host; the finish flow only looks up and
/// iterates.
#[derive(Debug, Clone, Default)]
pub struct RunningTasks {
    tasks: Arc<RwLock<HashMap<MessageRef, Arc<RunningTask>>>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message: MessageRef, task: Arc<RunningTask>) {
        self.tasks.write().insert(message, task);
    }

    pub fn remove(&self, message: &MessageRef) -> Option<Arc<RunningTask>> {
        self.tasks.write().remove(message)
    }

    pub fn get(&self, message: &MessageRef) -> Option<Arc<RunningTask>> {
        self.tasks.read().get(message).cloned()
    }

    pub fn snapshot(&self) -> Vec<(MessageRef, Arc<RunningTask>)> {
        self.tasks
            .read()
            .iter()
            .map(|(message, task)| (*message, task.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

/// Everything the host hands to a command invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub args_text: String,
    pub reply_text: Option<String>,
    pub reply_to: Option<MessageRef>,
    pub message: MessageRef,
    pub running_tasks: Option<RunningTasks>,
}

/// Text sent back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub text: String,
}

impl CommandResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_project_key_is_lowercased() {
        let ctx = RunContext::for_project("Dotfiles");
        assert_eq!(ctx.project_key(), Some("dotfiles".to_string()));
    }

    #[test]
    fn test_project_key_ignores_empty_project() {
        let ctx = RunContext::new(Some(String::new()), None);
        assert_eq!(ctx.project_key(), None);
    }

    #[test]
    fn test_explicit_branch_ignores_blank() {
        let ctx = RunContext::new(Some("app".into()), Some("   ".into()));
        assert_eq!(ctx.explicit_branch(), None);

        let ctx = RunContext::new(Some("app".into()), Some(" feat/x ".into()));
        assert_eq!(ctx.explicit_branch(), Some("feat/x"));
    }

    #[test]
    fn test_signal_set_is_idempotent() {
        let signal = Signal::new();
        assert!(!signal.is_set());
        signal.set();
        signal.set();
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn test_signal_wait_releases_after_set() {
        let signal = Signal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        signal.set();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should be released")
            .unwrap();
    }

    #[test]
    fn test_running_tasks_shared_between_clones() {
        let registry = RunningTasks::new();
        let host_view = registry.clone();
        let message = MessageRef::new(1, 10);

        host_view.insert(message, Arc::new(RunningTask::new(None)));
        assert!(registry.get(&message).is_some());
        assert_eq!(registry.len(), 1);

        host_view.remove(&message);
        assert!(registry.is_empty());
    }
}
