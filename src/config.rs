// Global configuration management

use crate::engine::RenderMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    /// Appended to the input file stem when naming outputs
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Output directory; next to each input when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub render_mode: RenderMode,

    /// Whether a hardware encoder (NVENC) can be used for the gpu slot
    #[serde(default)]
    pub gpu_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsConfig {
    #[serde(default = "default_true_config")]
    pub enabled: bool,

    /// Minimum seconds between stats.json writes
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Keep a per-job ffmpeg log under `<log_dir>/renders/`
    #[serde(default = "default_true_config")]
    pub render_logs: bool,

    /// Defaults to `logs/` in the config directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_output_suffix() -> String {
    "_ffduo".to_string()
}

fn default_true_config() -> bool {
    true
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_suffix: default_output_suffix(),
            output_dir: None,
            render_mode: RenderMode::Cpu,
            gpu_available: false,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            render_logs: true,
            log_dir: None,
        }
    }
}

/// Directory holding config.toml, stats.json and logs
pub fn config_dir() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".config")
            .join("ffduo")
    } else {
        dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ffduo")
    };
    Ok(dir)
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Not fatal: the directory may not be writable
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {}", e);
                eprintln!(
                    "Using built-in defaults. Run 'ffduo init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Create a default config file if it doesn't exist. Returns its path.
    pub fn ensure_default() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::ensure_default_at(&path)?;
        Ok(path)
    }

    /// Write defaults to `path` unless a file is already there
    pub fn ensure_default_at(path: &Path) -> Result<()> {
        if !path.exists() {
            Config::default().save_to(path)?;
        }
        Ok(())
    }

    /// Resolved directory for render logs
    pub fn log_dir(&self) -> Result<PathBuf> {
        match &self.logging.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("logs")),
        }
    }
}
