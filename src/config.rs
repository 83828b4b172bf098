// config.rs
use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REMOTE_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const ENV_API_URL: &str = "TODO_REMINDER_API_URL";
const ENV_DATA_FILE: &str = "TODO_REMINDER_DATA_FILE";

fn default_remote_base_url() -> String {
    DEFAULT_REMOTE_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_base_url: default_remote_base_url(),
            request_timeout_secs: default_timeout_secs(),
            data_file: None,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Environment variables win over the file.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.remote_base_url = url.trim().to_string();
            }
        }
        if let Some(path) = std::env::var_os(ENV_DATA_FILE) {
            if !path.is_empty() {
                self.data_file = Some(PathBuf::from(path));
            }
        }
        self
    }
}

/// Config and data locations for this app.
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("", "", "TodoReminder").ok_or(ConfigError::NoProjectDirs)?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn data_file(&self, config: &AppConfig) -> PathBuf {
        config
            .data_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("todos.json"))
    }
}

/// A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let file = match File::open(path.as_ref()) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn save_config<P: AsRef<Path>>(path: P, cfg: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.as_ref().parent() {
        create_dir_all(parent)?;
    }
    let file = File::create(path.as_ref())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, cfg)?;
    Ok(())
}
