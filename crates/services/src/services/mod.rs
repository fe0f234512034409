pub mod cancellation;
pub mod completion_workflow;
pub mod config;
pub mod finish;
pub mod git;
pub mod host;
pub mod session;
pub mod worktree;
