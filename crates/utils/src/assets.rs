use std::{ffi::OsString, path::PathBuf};

use directories::ProjectDirs;

const COMPLETION_SCRIPT_NAME: &str = "completion-workflow-start.sh";

/// Per-user directory holding this tool's own files (config).
///
/// ✔ macOS → ~/Library/Application Support/finish
/// ✔ Linux → ~/.local/share/finish   (respects XDG_DATA_HOME)
/// ✔ Windows → %APPDATA%\finish
pub fn asset_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "takopi", "finish").map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn config_path() -> Option<PathBuf> {
    asset_dir().map(|dir| dir.join("config.json"))
}

/// Root under which opencode keeps its data (`$XDG_DATA_HOME`, else `~/.local/share`).
pub fn data_home() -> PathBuf {
    data_home_from(std::env::var_os("XDG_DATA_HOME"), dirs::home_dir())
}

fn data_home_from(xdg_data_home: Option<OsString>, home: Option<PathBuf>) -> PathBuf {
    match xdg_data_home {
        Some(raw) if !raw.is_empty() => PathBuf::from(raw),
        _ => home.unwrap_or_default().join(".local").join("share"),
    }
}

/// Directory containing opencode session records for a given data root.
pub fn session_store_dir(data_root: &std::path::Path) -> PathBuf {
    data_root.join("opencode").join("storage").join("session")
}

/// Default location of the completion workflow entry point.
pub fn default_completion_script() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".config")
        .join("opencode")
        .join(COMPLETION_SCRIPT_NAME)
}
