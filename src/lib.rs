#![allow(clippy::float_cmp)]

pub mod adb;
pub mod adb_stt;
pub mod android_packagemanager;
pub mod android_packagemanager_stt;
pub mod api_catalog;
pub mod api_catalog_stt;
pub mod app_operations_queue;
pub mod app_operations_queue_stt;
pub mod calc_appstate;
pub mod calc_appstate_stt;
pub mod calc_version;
pub mod db_preferences;
pub mod db_preferences_stt;
pub mod notify;
pub mod notify_stt;
pub mod shared_store;
pub mod shared_store_stt;
pub mod store_view;
pub mod store_view_stt;
pub mod update_check_worker;
pub mod update_check_worker_stt;

pub mod log_capture;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a level name case-insensitively, falling back to `Error`.
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::TRACE => LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_apps_endpoint")]
    pub apps_endpoint: String,
    #[serde(default = "default_data_endpoint")]
    pub data_endpoint: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub show_logs: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Packages starting with this are the store itself
    #[serde(default = "default_self_package_prefix")]
    pub self_package_prefix: String,
    /// adb serial; the only attached device when empty
    #[serde(default)]
    pub adb_device: Option<String>,
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://thefeather.ink/apps/".to_string()
}

fn default_apps_endpoint() -> String {
    "mind.json".to_string()
}

fn default_data_endpoint() -> String {
    "data.php".to_string()
}

fn default_log_level() -> String {
    "Error".to_string()
}

fn default_self_package_prefix() -> String {
    "com.mindapps".to_string()
}

fn default_check_interval_hours() -> u64 {
    4
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            apps_endpoint: default_apps_endpoint(),
            data_endpoint: default_data_endpoint(),
            secret_key: String::new(),
            show_logs: false,
            log_level: default_log_level(),
            self_package_prefix: default_self_package_prefix(),
            adb_device: None,
            check_interval_hours: default_check_interval_hours(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Settings {
    /// Apply `MINDAPPS_*` environment variables over file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = [
            ("MINDAPPS_API_BASE_URL", &mut self.api_base_url),
            ("MINDAPPS_APPS_ENDPOINT", &mut self.apps_endpoint),
            ("MINDAPPS_DATA_ENDPOINT", &mut self.data_endpoint),
            ("MINDAPPS_SECRET_KEY", &mut self.secret_key),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                tracing::debug!("{} set from environment", key);
                *field = value;
            }
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "mindapps", "mindapps")
            .context("Failed to get project directories")?;

        Self::from_dirs(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.cache_dir().to_path_buf(),
        )
    }

    /// All directories under `root`, for tests and portable installs.
    pub fn with_root(root: &Path) -> Result<Self> {
        Self::from_dirs(root.join("config"), root.join("cache"))
    }

    fn from_dirs(config_dir: PathBuf, cache_dir: PathBuf) -> Result<Self> {
        let download_dir = cache_dir.join("downloads");

        // Create directories if they don't exist
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {:?}", config_dir))?;
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create {:?}", cache_dir))?;
        fs::create_dir_all(&download_dir)
            .with_context(|| format!("Failed to create {:?}", download_dir))?;

        Ok(Config {
            config_dir,
            cache_dir,
            download_dir,
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.txt")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.config_dir.join("preferences.json")
    }

    pub fn load_settings(&self) -> Result<Settings> {
        let settings_path = self.settings_path();

        if !settings_path.exists() {
            return Ok(Settings::default());
        }

        let contents =
            fs::read_to_string(&settings_path).context("Failed to read settings file")?;

        let settings: Settings =
            serde_json::from_str(&contents).context("Failed to parse settings JSON")?;

        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let settings_path = self.settings_path();

        let json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        fs::write(&settings_path, json).context("Failed to write settings file")?;

        tracing::info!("Settings saved to {:?}", settings_path);
        Ok(())
    }
}
