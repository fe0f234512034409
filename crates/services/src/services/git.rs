//! Read-only access to git worktree metadata.

mod cli;
pub mod disposable;

pub use cli::{GitCli, GitCliError, WorktreeEntry, parse_worktree_list};
pub use disposable::{DisposableWorktreeFinder, is_disposable_worktree_path};
