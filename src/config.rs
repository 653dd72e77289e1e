// User configuration
// TOML file under the XDG config directory, created with defaults on first use

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::effect::DEFAULT_LED_COUNT;
use crate::loader::UiMode;
use crate::scheduler::TickErrorPolicy;

const DEFAULT_CONFIG_TOML: &str = r#"# led-preview configuration

# Effect pack: a directory or an http(s):// base URL
effects_root = "effects"

# Device geometry pack
devices_root = "devices"

# LED count when no device is selected
default_led_count = 20

# Panel source: "json" (ui.json) or "script" (ui.rhai)
ui_mode = "json"

# What a failing tick does: "halt", "skip-frame" or "propagate"
tick_error_policy = "halt"

# Check effect sources before compiling them
type_check = false

# Terminal preview redraw cap
preview_fps = 30
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub effects_root: String,
    pub devices_root: String,
    pub default_led_count: usize,
    pub ui_mode: UiMode,
    pub tick_error_policy: TickErrorPolicy,
    pub type_check: bool,
    pub preview_fps: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            effects_root: "effects".to_string(),
            devices_root: "devices".to_string(),
            default_led_count: DEFAULT_LED_COUNT,
            ui_mode: UiMode::Json,
            tick_error_policy: TickErrorPolicy::Halt,
            type_check: false,
            preview_fps: 30,
        }
    }
}

impl PreviewConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load the user config, writing the default file if there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if !path.exists() {
            let write_err = |source| ConfigError::Write {
                path: path.clone(),
                source,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
            std::fs::write(&path, DEFAULT_CONFIG_TOML).map_err(write_err)?;
            info!(path = %path.display(), "created default config");
        }
        Self::load(&path)
    }

    /// Redraw interval of the terminal preview
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / u64::from(self.preview_fps.clamp(1, 120)))
    }
}

/// `config.toml` inside the config directory
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn config_dir() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("led-preview")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config/led-preview")
    } else {
        PathBuf::from("/tmp/led-preview")
    }
}
