use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use super::host::{CommandHost, HostError, RunContext};

/// Substrings the OS puts in errors when it briefly runs out of processes.
const TRANSIENT_ERROR_MARKERS: [&str; 2] = ["cannot fork()", "Resource temporarily unavailable"];

/// How a failed directory resolution should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// Temporary resource exhaustion; worth retrying after a pause.
    Transient,
    Fatal,
}

pub fn classify_resolution_error(error: &HostError) -> ResolutionFailure {
    let message = error.to_string();
    if TRANSIENT_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        ResolutionFailure::Transient
    } else {
        ResolutionFailure::Fatal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(3),
        }
    }
}

/// Resolves run contexts to directories through the host, one caller at a time.
///
/// Resolution may create or prune worktrees on the host side, so every
/// resolver sharing `lock` is serialized for the whole retry sequence.
#[derive(Clone)]
pub struct WorktreeResolver {
    host: Arc<dyn CommandHost>,
    lock: Arc<Mutex<()>>,
    policy: RetryPolicy,
}

impl WorktreeResolver {
    pub fn new(host: Arc<dyn CommandHost>, lock: Arc<Mutex<()>>) -> Self {
        Self {
            host,
            lock,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn resolve_with_retry(
        &self,
        context: &RunContext,
    ) -> Result<Option<PathBuf>, HostError> {
        let _guard = self.lock.lock().await;
        let attempts = self.policy.attempts;
        let mut delay = self.policy.initial_delay;

        for attempt in 1..=attempts {
            let attempts_remain = attempt < attempts;
            match self.host.resolve_run_cwd(context).await {
                Ok(Some(cwd)) => return Ok(Some(cwd)),
                Ok(None) => {
                    if attempts_remain {
                        tokio::task::yield_now().await;
                    }
                }
                Err(e) => {
                    if attempts_remain
                        && classify_resolution_error(&e) == ResolutionFailure::Transient
                    {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Transient worktree resolution failure, retrying: {}",
                            e
                        );
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(self.policy.max_delay);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Ok(None)
    }
}
