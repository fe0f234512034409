use std::{path::Path, time::SystemTime};

use super::cli::{GitCli, WorktreeEntry};

/// Path segments under which scratch worktrees are created.
const DISPOSABLE_SEGMENTS: [&str; 2] = ["/.opencode/worktrees/", "/.worktrees/"];

pub fn is_disposable_worktree_path(path: &Path) -> bool {
    let value = path.to_string_lossy();
    DISPOSABLE_SEGMENTS
        .iter()
        .any(|segment| value.contains(segment))
}

/// Finds the scratch worktree of a repository that was touched last.
#[derive(Clone, Default)]
pub struct DisposableWorktreeFinder {
    git: GitCli,
}

impl DisposableWorktreeFinder {
    pub fn new(git: GitCli) -> Self {
        Self { git }
    }

    pub async fn latest_disposable_worktree(&self, repo_root: &Path) -> Option<WorktreeEntry> {
        let entries = match self.git.list_worktrees(repo_root).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Could not list worktrees of {}: {}", repo_root.display(), e);
                return None;
            }
        };

        match tokio::task::spawn_blocking(move || {
            select_latest_disposable(entries, probe_worktree_dir)
        })
        .await
        {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!("Worktree probe task failed: {}", e);
                None
            }
        }
    }
}

/// Modification time of `path` if it is an existing directory.
fn probe_worktree_dir(path: &Path) -> Option<SystemTime> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to stat worktree {}: {}", path.display(), e);
            }
            return None;
        }
    };
    if !metadata.is_dir() {
        return None;
    }
    match metadata.modified() {
        Ok(modified) => Some(modified),
        Err(e) => {
            tracing::warn!("No modification time for {}: {}", path.display(), e);
            None
        }
    }
}

/// Pick the disposable entry with the newest modification time.
///
/// `probe` returns `None` for paths that are missing, not directories or not
/// stat-able; those entries are skipped. Ties keep the earlier listed entry.
pub fn select_latest_disposable<F>(
    entries: Vec<WorktreeEntry>,
    mut probe: F,
) -> Option<WorktreeEntry>
where
    F: FnMut(&Path) -> Option<SystemTime>,
{
    let mut latest: Option<(SystemTime, WorktreeEntry)> = None;

    for entry in entries {
        if !is_disposable_worktree_path(&entry.path) {
            continue;
        }
        let Some(modified) = probe(&entry.path) else {
            continue;
        };
        let newer = latest
            .as_ref()
            .is_none_or(|(best, _)| modified > *best);
        if newer {
            latest = Some((modified, entry));
        }
    }

    latest.map(|(_, entry)| entry)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

    use tempfile::TempDir;

    use super::{super::cli::tests::*, *};

    fn entry(path: &str, branch: &str) -> WorktreeEntry {
        WorktreeEntry {
            path: PathBuf::from(path),
            branch: branch.to_string(),
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_is_disposable_worktree_path() {
        assert!(is_disposable_worktree_path(Path::new("/repo/.worktrees/a")));
        assert!(is_disposable_worktree_path(Path::new("/repo/.opencode/worktrees/b")));
        assert!(!is_disposable_worktree_path(Path::new("/repo/main")));
        assert!(!is_disposable_worktree_path(Path::new("/repo/worktrees/c")));
    }

    #[test]
    fn test_select_latest_ignores_non_disposable_newer_entry() {
        let mtimes: HashMap<PathBuf, SystemTime> = [
            ("/repo/.worktrees/a", at(100)),
            ("/repo/.opencode/worktrees/b", at(200)),
            ("/repo/main", at(300)),
        ]
        .into_iter()
        .map(|(p, t)| (PathBuf::from(p), t))
        .collect();
        let entries = vec![
            entry("/repo/.worktrees/a", "br-a"),
            entry("/repo/.opencode/worktrees/b", "br-b"),
            entry("/repo/main", "main"),
        ];

        let latest = select_latest_disposable(entries, |p| mtimes.get(p).copied());

        assert_eq!(latest, Some(entry("/repo/.opencode/worktrees/b", "br-b")));
    }

    #[test]
    fn test_select_latest_skips_unprobeable_entries() {
        let entries = vec![
            entry("/repo/.worktrees/gone", "gone"),
            entry("/repo/.worktrees/here", "here"),
        ];
        let latest = select_latest_disposable(entries, |p| {
            p.ends_with("here").then_some(at(1))
        });
        assert_eq!(latest.unwrap().branch, "here");
    }

    #[test]
    fn test_select_latest_tie_keeps_listing_order() {
        let entries = vec![
            entry("/repo/.worktrees/first", "first"),
            entry("/repo/.worktrees/second", "second"),
        ];
        let latest = select_latest_disposable(entries, |_| Some(at(50)));
        assert_eq!(latest.unwrap().branch, "first");
    }

    #[test]
    fn test_select_latest_none_without_candidates() {
        let entries = vec![entry("/repo/main", "main")];
        assert_eq!(select_latest_disposable(entries, |_| Some(at(1))), None);
    }

    #[tokio::test]
    async fn test_latest_disposable_worktree_from_real_repo() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        init_test_repo_via_cli(&repo);
        add_worktree_via_cli(&repo, &repo.join(".worktrees").join("scratch"), "scratch");
        add_worktree_via_cli(&repo, &temp_dir.path().join("sibling"), "sibling");

        let latest = DisposableWorktreeFinder::default()
            .latest_disposable_worktree(&repo)
            .await
            .expect("scratch worktree should be found");

        assert_eq!(latest.branch, "scratch");
        assert!(latest.path.ends_with(".worktrees/scratch"));
    }

    #[tokio::test]
    async fn test_latest_disposable_worktree_not_a_repo() {
        let temp_dir = TempDir::new().unwrap();
        let latest = DisposableWorktreeFinder::default()
            .latest_disposable_worktree(temp_dir.path())
            .await;
        assert_eq!(latest, None);
    }
}
