//! Picking and stopping the run a `/finish` refers to.
//!
//! Cancellation is cooperative: we raise the task's `cancel_requested` signal
//! and wait a bounded time for it to raise `done`.

use std::{sync::Arc, time::Duration};

use super::host::{ChannelId, MessageRef, RunContext, RunningTask, RunningTasks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    TimedOut,
}

/// Find the running task the invocation targets.
///
/// A reply to a tracked message wins outright. Otherwise the task must be the
/// only one in `channel_id` whose context equals `resolved_context`; zero or
/// several matches select nothing.
pub fn select_cancel_target(
    reply_to: Option<&MessageRef>,
    channel_id: ChannelId,
    resolved_context: Option<&RunContext>,
    running_tasks: &RunningTasks,
) -> Option<(MessageRef, Arc<RunningTask>)> {
    if let Some(reply_to) = reply_to
        && let Some(task) = running_tasks.get(reply_to)
    {
        return Some((*reply_to, task));
    }

    let resolved_context = resolved_context?;

    let mut candidates = running_tasks
        .snapshot()
        .into_iter()
        .filter(|(message, task)| {
            message.channel_id == channel_id && task.context.as_ref() == Some(resolved_context)
        });

    let only = candidates.next()?;
    if candidates.next().is_some() {
        tracing::debug!(
            channel_id,
            "Several running tasks match the finish context; not cancelling any"
        );
        return None;
    }
    Some(only)
}

/// Ask `task` to stop and wait up to `timeout` for it to finish.
///
/// A timeout leaves the task running; its later completion is simply not
/// awaited.
pub async fn cancel_and_await(task: &RunningTask, timeout: Duration) -> CancelOutcome {
    task.cancel_requested.set();
    match tokio::time::timeout(timeout, task.done.wait()).await {
        Ok(()) => CancelOutcome::Cancelled,
        Err(_) => CancelOutcome::TimedOut,
    }
}
