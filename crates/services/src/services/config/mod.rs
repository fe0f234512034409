use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utils::{assets::default_completion_script, path::expand_tilde};

const CONFIG_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_config_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_cancel_timeout_s() -> u64 {
    60
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Main checkout of the project; `~` is expanded.
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: String,
    /// Upper bound on waiting for a cancelled run to stop.
    #[serde(default = "default_cancel_timeout_s")]
    pub cancel_timeout_s: u64,
    /// Overrides `~/.config/opencode/completion-workflow-start.sh`.
    #[serde(default)]
    pub completion_script: Option<String>,
    /// Project key → checkout, used by the local host.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            cancel_timeout_s: default_cancel_timeout_s(),
            completion_script: None,
            projects: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_s)
    }

    pub fn completion_script_path(&self) -> PathBuf {
        match self.completion_script.as_deref() {
            Some(script) if !script.trim().is_empty() => expand_tilde(script.trim()),
            _ => default_completion_script(),
        }
    }

    /// Checkout path of `project`, matched case-insensitively.
    pub fn project_path(&self, project: &str) -> Option<PathBuf> {
        self.projects
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(project))
            .map(|(_, project)| expand_tilde(&project.path))
    }

    /// Canonical (lowercased) key of a configured project.
    pub fn project_key(&self, project: &str) -> Option<String> {
        self.projects
            .keys()
            .find(|key| key.eq_ignore_ascii_case(project))
            .map(|key| key.to_lowercase())
    }
}

impl From<String> for Config {
    fn from(raw_config: String) -> Self {
        match serde_json::from_str::<Config>(&raw_config) {
            Ok(config) => {
                if config.config_version != CONFIG_VERSION {
                    tracing::warn!(
                        "Unknown config version {}, reading it as {}",
                        config.config_version,
                        CONFIG_VERSION
                    );
                }
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config: {}, using defaults", e);
                Config::default()
            }
        }
    }
}

/// Will always return config, falling back to defaults
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => Config::from(raw_config),
        Err(_) => {
            tracing::info!("No config file found at {}, using defaults", config_path.display());
            Config::default()
        }
    }
}

/// Saves the config to the given path
pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}
