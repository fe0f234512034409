//! Lookup of opencode sessions referenced by `ses_...` tokens.
//!
//! Every failure in here is absorbed: a token that cannot be mapped to an
//! existing directory simply yields `None` and the caller falls back to the
//! structured context.

use std::{
    cmp::Reverse,
    path::{Path, PathBuf},
    time::SystemTime,
};

use globwalk::GlobWalkerBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use utils::assets::{data_home, session_store_dir};

static SESSION_ID_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| match Regex::new(r"\bses_[A-Za-z0-9]+\b") {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("Invalid session id pattern: {}", e);
            None
        }
    });

/// First `ses_<alphanumeric>` token in `text`, verbatim.
pub fn extract_session_id(text: &str) -> Option<&str> {
    if text.is_empty() {
        return None;
    }
    SESSION_ID_PATTERN
        .as_ref()?
        .find(text)
        .map(|m| m.as_str())
}

/// Read-only view of the opencode session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at `<data_root>/opencode/storage/session`.
    pub fn new(data_root: &Path) -> Self {
        Self {
            sessions_dir: session_store_dir(data_root),
        }
    }

    /// Store under `$XDG_DATA_HOME`, falling back to `~/.local/share`.
    pub fn from_env() -> Self {
        Self::new(&data_home())
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Working directory recorded for `session_id`, if it still exists.
    pub async fn locate_session_directory(&self, session_id: &str) -> Option<PathBuf> {
        if !is_plain_session_id(session_id) {
            return None;
        }
        let sessions_dir = self.sessions_dir.clone();
        let session_id = session_id.to_string();
        match tokio::task::spawn_blocking(move || locate_blocking(&sessions_dir, &session_id))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Session lookup task failed: {}", e);
                None
            }
        }
    }
}

/// Ids are interpolated into a glob, so only accept the token alphabet.
fn is_plain_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn locate_blocking(sessions_dir: &Path, session_id: &str) -> Option<PathBuf> {
    let session_file = find_session_file(sessions_dir, session_id)?;
    tracing::debug!(
        session_id,
        file = %session_file.display(),
        "Found session record"
    );
    read_session_directory(&session_file)
}

fn find_session_file(sessions_dir: &Path, session_id: &str) -> Option<PathBuf> {
    if !sessions_dir.is_dir() {
        return None;
    }

    let pattern = format!("**/{session_id}.json");
    let walker = match GlobWalkerBuilder::from_patterns(sessions_dir, &[&pattern])
        .file_type(globwalk::FileType::FILE)
        .build()
    {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("Invalid session glob '{pattern}': {e}");
            return None;
        }
    };

    let candidates = walker
        .flatten()
        .map(|entry| {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            (entry.into_path(), modified)
        })
        .collect();

    pick_session_file(candidates)
}

/// Most recently modified record wins; ties go to the smallest path.
fn pick_session_file(candidates: Vec<(PathBuf, Option<SystemTime>)>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .max_by(|(a_path, a_time), (b_path, b_time)| {
            (a_time, Reverse(a_path)).cmp(&(b_time, Reverse(b_path)))
        })
        .map(|(path, _)| path)
}

fn read_session_directory(session_file: &Path) -> Option<PathBuf> {
    let raw = match std::fs::read_to_string(session_file) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Failed to read session record {}: {}", session_file.display(), e);
            return None;
        }
    };
    let record: Value = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Failed to parse session record {}: {}", session_file.display(), e);
            return None;
        }
    };

    let directory = record.get("directory")?.as_str()?;
    if directory.is_empty() {
        return None;
    }
    let path = PathBuf::from(directory);
    path.is_dir().then_some(path)
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use tempfile::TempDir;

    use super::*;

    fn write_record(store: &SessionStore, relative: &str, body: &str) -> PathBuf {
        let path = store.sessions_dir().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_extract_session_id_finds_token() {
        let text = "please finish ses_4fA9zz now";
        assert_eq!(extract_session_id(text), Some("ses_4fA9zz"));
    }

    #[test]
    fn test_extract_session_id_returns_first_match() {
        let text = "ses_first\nthen ses_second";
        assert_eq!(extract_session_id(text), Some("ses_first"));
    }

    #[test]
    fn test_extract_session_id_none_when_absent() {
        assert_eq!(extract_session_id(""), None);
        assert_eq!(extract_session_id("no session here"), None);
        assert_eq!(extract_session_id("ses_"), None);
    }

    #[test]
    fn test_extract_session_id_requires_word_boundary() {
        assert_eq!(extract_session_id("xses_abc"), None);
        assert_eq!(extract_session_id("(ses_abc)"), Some("ses_abc"));
    }

    #[tokio::test]
    async fn test_locate_session_directory_nested_record() {
        let data = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let store = SessionStore::new(data.path());
        let body = serde_json::json!({ "directory": workdir.path() }).to_string();
        write_record(&store, "project-a/ses_abc123.json", &body);

        let found = store.locate_session_directory("ses_abc123").await;
        assert_eq!(found, Some(workdir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_locate_session_directory_missing_store() {
        let data = TempDir::new().unwrap();
        let store = SessionStore::new(data.path());
        assert_eq!(store.locate_session_directory("ses_abc123").await, None);
    }

    #[tokio::test]
    async fn test_locate_session_directory_invalid_json() {
        let data = TempDir::new().unwrap();
        let store = SessionStore::new(data.path());
        write_record(&store, "p/ses_bad.json", "{ not json");

        assert_eq!(store.locate_session_directory("ses_bad").await, None);
    }

    #[tokio::test]
    async fn test_locate_session_directory_rejects_bad_directory_values() {
        let data = TempDir::new().unwrap();
        let store = SessionStore::new(data.path());
        write_record(&store, "p/ses_num.json", r#"{"directory": 42}"#);
        write_record(&store, "p/ses_none.json", r#"{"title": "x"}"#);
        write_record(&store, "p/ses_gone.json", r#"{"directory": "/definitely/not/here"}"#);
        write_record(&store, "p/ses_list.json", r#"["/tmp"]"#);

        for id in ["ses_num", "ses_none", "ses_gone", "ses_list"] {
            assert_eq!(store.locate_session_directory(id).await, None, "{id}");
        }
    }

    #[tokio::test]
    async fn test_locate_session_directory_rejects_glob_syntax() {
        let data = TempDir::new().unwrap();
        let store = SessionStore::new(data.path());
        assert_eq!(store.locate_session_directory("*").await, None);
        assert_eq!(store.locate_session_directory("").await, None);
    }

    #[test]
    fn test_pick_session_file_prefers_newest() {
        let base = SystemTime::UNIX_EPOCH;
        let picked = pick_session_file(vec![
            (PathBuf::from("/s/a/ses_x.json"), Some(base + Duration::from_secs(10))),
            (PathBuf::from("/s/b/ses_x.json"), Some(base + Duration::from_secs(20))),
            (PathBuf::from("/s/c/ses_x.json"), None),
        ]);
        assert_eq!(picked, Some(PathBuf::from("/s/b/ses_x.json")));
    }

    #[test]
    fn test_pick_session_file_ties_go_to_smallest_path() {
        let at = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(5));
        let picked = pick_session_file(vec![
            (PathBuf::from("/s/z/ses_x.json"), at),
            (PathBuf::from("/s/a/ses_x.json"), at),
            (PathBuf::from("/s/m/ses_x.json"), at),
        ]);
        assert_eq!(picked, Some(PathBuf::from("/s/a/ses_x.json")));
    }

    #[test]
    fn test_pick_session_file_empty() {
        assert_eq!(pick_session_file(Vec::new()), None);
    }
}
