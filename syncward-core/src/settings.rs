//! Runtime settings and the on-disk layout under the base directory.
//!
//! # Storage layout
//!
//! ```text
//! <base>/
//!   settings.yaml            (optional, defaults when absent)
//!   state/<code>.state       (one ProcessingState JSON per project)
//!   queues/<stage>/<code>    (one entry per pending project per stage)
//!   webwork/<code>/          (local clones)
//!   documents/<code>/        (file-backed remote document store)
//!   reports/                 (partial-failure reports)
//!   logs/syncward.log
//! <lock_dir>/syncward.pid    (host-level sweep lock)
//! ```
//!
//! Values from `settings.yaml` are overridden by `SYNCWARD_*` environment
//! variables. [`Settings::load_at`] takes the environment as a lookup
//! function so tests never touch the process environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{ProjectCode, QueueStage};

pub const SETTINGS_FILE: &str = "settings.yaml";
pub const LOCK_FILE: &str = "syncward.pid";
pub const LOG_FILE: &str = "syncward.log";

pub const ENV_BASE_DIR: &str = "SYNCWARD_BASE_DIR";
pub const ENV_WEBWORK_DIR: &str = "SYNCWARD_WEBWORK_DIR";
pub const ENV_BRIDGE_COMMAND: &str = "SYNCWARD_BRIDGE_COMMAND";
pub const ENV_REMOTE_URI: &str = "SYNCWARD_REMOTE_URI";
pub const ENV_LOCK_DIR: &str = "SYNCWARD_LOCK_DIR";
pub const ENV_LOG_LEVEL: &str = "SYNCWARD_LOG_LEVEL";

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of all durable state. Never read from the YAML file itself.
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Local clone root; relative paths resolve against `base_dir`.
    pub webwork_dir: PathBuf,
    /// Directory holding the host lock; `<base>/run` when unset.
    pub lock_dir: Option<PathBuf>,
    /// External bridge executable. `None` disables network exchange.
    pub bridge_command: Option<String>,
    /// Base URI of the remote repository host.
    pub remote_uri: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Write logs to `<base>/logs/syncward.log` instead of stderr.
    pub log_to_file: bool,
    /// Oldest data model version the bridge can still handle.
    pub minimal_model_version: u32,
    /// Model version assumed for freshly created clones.
    pub default_model_version: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::new(),
            webwork_dir: PathBuf::from("webwork"),
            lock_dir: None,
            bridge_command: None,
            remote_uri: "https://hg.example.org".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            log_to_file: false,
            minimal_model_version: 7_000_068,
            default_model_version: 7_000_072,
        }
    }
}

impl Settings {
    /// Settings rooted at `base` with defaults only.
    pub fn with_base_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base.into(),
            ..Self::default()
        }
    }

    /// Resolve the base dir (explicit → `SYNCWARD_BASE_DIR` → `~/.syncward`)
    /// and load from it using the process environment.
    pub fn load(base_override: Option<PathBuf>) -> Result<Self, CoreError> {
        let base = match base_override {
            Some(base) => base,
            None => match std::env::var_os(ENV_BASE_DIR) {
                Some(base) => PathBuf::from(base),
                None => default_base_dir()?,
            },
        };
        Self::load_at(&base, |key| std::env::var(key).ok())
    }

    /// Load `<base>/settings.yaml` (if present) and apply overrides from `env`.
    pub fn load_at(
        base: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let path = base.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            if contents.trim().is_empty() {
                Settings::default()
            } else {
                serde_yaml::from_str(&contents)
                    .map_err(|source| CoreError::SettingsParse { path, source })?
            }
        } else {
            Settings::default()
        };
        settings.base_dir = base.to_path_buf();
        settings.apply_env(env);
        Ok(settings)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env(ENV_WEBWORK_DIR) {
            self.webwork_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env(ENV_LOCK_DIR) {
            self.lock_dir = Some(PathBuf::from(dir));
        }
        if let Some(cmd) = env(ENV_BRIDGE_COMMAND) {
            self.bridge_command = Some(cmd).filter(|c| !c.trim().is_empty());
        }
        if let Some(uri) = env(ENV_REMOTE_URI) {
            self.remote_uri = uri;
        }
        if let Some(level) = env(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    /// Write the current settings as `<base>/settings.yaml` unless one exists.
    pub fn write_default_file(&self) -> Result<bool, CoreError> {
        let path = self.base_dir.join(SETTINGS_FILE);
        if path.exists() {
            return Ok(false);
        }
        let yaml = serde_yaml::to_string(self)?;
        crate::fs::atomic_write(&path, yaml.as_bytes())?;
        Ok(true)
    }

    // -- layout -----------------------------------------------------------

    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    pub fn state_file(&self, code: &ProjectCode) -> PathBuf {
        self.state_dir().join(format!("{}.state", code.0))
    }

    pub fn queues_dir(&self) -> PathBuf {
        self.base_dir.join("queues")
    }

    /// `None` for the sentinel stage, which has no directory.
    pub fn queue_dir(&self, stage: QueueStage) -> Option<PathBuf> {
        stage.dir_name().map(|name| self.queues_dir().join(name))
    }

    pub fn webwork_root(&self) -> PathBuf {
        if self.webwork_dir.is_absolute() {
            self.webwork_dir.clone()
        } else {
            self.base_dir.join(&self.webwork_dir)
        }
    }

    /// Local clone directory of one project.
    pub fn project_dir(&self, code: &ProjectCode) -> PathBuf {
        self.webwork_root().join(&code.0)
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.base_dir.join("reports")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("run"))
            .join(LOCK_FILE)
    }

    /// Create every directory of the layout.
    pub fn ensure_layout(&self) -> Result<(), CoreError> {
        let mut dirs = vec![
            self.state_dir(),
            self.webwork_root(),
            self.documents_dir(),
            self.reports_dir(),
            self.logs_dir(),
        ];
        dirs.extend(QueueStage::REAL.iter().filter_map(|s| self.queue_dir(*s)));
        for dir in dirs {
            crate::fs::ensure_dir(&dir)?;
        }
        Ok(())
    }
}

fn default_base_dir() -> Result<PathBuf, CoreError> {
    dirs::home_dir()
        .map(|home| home.join(".syncward"))
        .ok_or(CoreError::HomeNotFound)
}
