//! Application paths and settings.
//!
//! Directory priority:
//! 1. CLI `--config-dir` argument
//! 2. `STAYCAL_CONFIG_DIR` environment variable
//! 3. Local folder IF any staycal files exist there (staycal.json, session.json, staycal.log)
//! 4. Platform-specific directory from dirs-next (default)
//!
//! Platform paths:
//! - Linux: ~/.config/staycal/{name} (data: ~/.local/share/staycal/{name})
//! - macOS: ~/Library/Application Support/staycal/{name}
//! - Windows: %APPDATA%\staycal\{name}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "staycal.json";
pub const SESSION_FILE: &str = "session.json";
pub const LOG_FILE: &str = "staycal.log";

const LOCAL_FILES: [&str; 3] = [SETTINGS_FILE, SESSION_FILE, LOG_FILE];
const APP_DIR: &str = "staycal";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (STAYCAL_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("STAYCAL_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Path to a data file (session, logs).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_FILES.iter().any(|f| dir.join(f).exists())
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_files(&current_dir) {
            return current_dir;
        }
    }

    match platform {
        Some(dir) => dir.join(APP_DIR),
        None => PathBuf::from("."),
    }
}

// ========== Settings ==========

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Contents of `staycal.json`. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// 0 = one per CPU, capped at 4.
    pub worker_threads: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: 10_000,
            worker_threads: 0,
        }
    }
}

impl AppSettings {
    /// Read settings from `path`; defaults if it doesn't exist. The
    /// `STAYCAL_API_URL` variable overrides the file's URL.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings: {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid settings file: {}", path.display()))?
        } else {
            debug!("No settings at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(url) = std::env::var("STAYCAL_API_URL") {
            if !url.trim().is_empty() {
                info!("API URL from STAYCAL_API_URL: {}", url);
                settings.api_base_url = url;
            }
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn worker_count(&self) -> usize {
        match self.worker_threads {
            0 => num_cpus::get().clamp(1, 4),
            n => n,
        }
    }
}
