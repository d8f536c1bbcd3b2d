//! Runtime settings resolved from the environment, with command-line overrides.

use crate::ai::CliModel;
use crate::error::Result;
use crate::store::Session;
use std::env;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = ".visiontrack";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const MIN_MODEL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub user: Option<String>,
    pub model_bin: Option<String>,
    pub model: Option<String>,
    pub model_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("VISIONTRACK_DATA_DIR")
            .or_else(|| get("VISIONTRACK_HOME"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let timeout = get("VISIONTRACK_MODEL_TIMEOUT")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS)
            .max(MIN_MODEL_TIMEOUT_SECS);

        Self {
            data_dir,
            user: get("VISIONTRACK_USER").map(|v| v.trim().to_string()),
            model_bin: get("VISIONTRACK_MODEL_BIN"),
            model: get("VISIONTRACK_MODEL"),
            model_timeout: Duration::from_secs(timeout),
        }
    }

    /// Flags given on the command line win over the environment.
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, user: Option<String>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        if let Some(user) = user.filter(|u| !u.trim().is_empty()) {
            self.user = Some(user.trim().to_string());
        }
        self
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn renders_dir(&self) -> PathBuf {
        self.data_dir.join("renders")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("model")
    }

    pub fn session(&self) -> Result<Session> {
        Session::new(self.user.clone().unwrap_or_default())
    }

    /// `None` when no model executable is configured or found on PATH.
    pub fn model_client(&self) -> Option<CliModel> {
        let bin = resolve_model_bin(self.model_bin.as_deref())?;
        Some(
            CliModel::new(bin, self.model_dir())
                .with_model(self.model.clone())
                .with_timeout(self.model_timeout),
        )
    }
}

fn resolve_model_bin(override_bin: Option<&str>) -> Option<String> {
    if let Some(bin) = override_bin {
        let trimmed = bin.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    ["codex", "codex-auto"]
        .into_iter()
        .find(|name| command_exists(name))
        .map(ToString::to_string)
}

fn command_exists(name: &str) -> bool {
    Command::new("bash")
        .arg("-lc")
        .arg(format!("command -v {name} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
