//! Configuration management

use anyhow::{Context, Result};
use deckhand_protocol::ELGATO_VENDOR_ID;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HID transport and enumeration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HidConfig {
    /// USB Vendor ID
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// Length of one input read slice in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Initial enumeration poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound for the enumeration backoff in milliseconds
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_ms: u64,
    /// Connect every supported device found while polling
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

fn default_vendor_id() -> u16 {
    ELGATO_VENDOR_ID
}
fn default_read_timeout() -> u64 {
    50
}
fn default_poll_interval() -> u64 {
    500
}
fn default_max_poll_interval() -> u64 {
    5000
}
fn default_auto_connect() -> bool {
    true
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            read_timeout_ms: default_read_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_poll_interval_ms: default_max_poll_interval(),
            auto_connect: default_auto_connect(),
        }
    }
}

impl HidConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Brightness applied on connect (0-100 %)
    #[serde(default = "default_brightness")]
    pub default_brightness: u8,
    /// Encoded images kept per input before the oldest is evicted
    #[serde(default = "default_image_cache_size")]
    pub image_cache_size: usize,
}

fn default_brightness() -> u8 {
    60
}
fn default_image_cache_size() -> usize {
    16
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_brightness: default_brightness(),
            image_cache_size: default_image_cache_size(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HID configuration
    #[serde(default)]
    pub hid: HidConfig,
    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "deckhand", "Deckhand")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
