use anyhow::{anyhow, Result};
use log::{debug, info};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_URL_ENV: &str = "GLIMPSE_API_URL";
pub const WS_URL_ENV: &str = "GLIMPSE_WS_URL";

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Client settings; every field falls back to its default when absent from the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub typing_window_ms: u64,
    pub story_duration_ms: u64,
    pub story_tick_ms: u64,
    /// How long a sent message may wait for the server echo before rollback.
    pub send_timeout_ms: u64,
    pub dismiss_threshold_px: f32,
    pub hydrate_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base_url: "http://localhost:3000".to_string(),
            ws_base_url: "ws://localhost:3000/ws".to_string(),
            typing_window_ms: 2000,
            story_duration_ms: 5000,
            story_tick_ms: 50,
            send_timeout_ms: 10_000,
            dismiss_threshold_px: 120.0,
            hydrate_limit: 50,
        }
    }
}

impl ClientConfig {
    pub fn typing_window(&self) -> Duration {
        Duration::from_millis(self.typing_window_ms)
    }

    pub fn story_duration(&self) -> Duration {
        Duration::from_millis(self.story_duration_ms)
    }

    pub fn story_tick(&self) -> Duration {
        Duration::from_millis(self.story_tick_ms.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Load from `path`, or from the default location when `None`. A missing
    /// file yields the defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => get_config_dir()?.join("config.json"),
        };

        let mut config = if path.exists() {
            let mut contents = String::new();
            File::open(&path)?.read_to_string(&mut contents)?;
            let config: ClientConfig = serde_json::from_str(&contents)
                .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            debug!("No config at {}, using defaults", path.display());
            ClientConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            debug!("API URL overridden by {}", API_URL_ENV);
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var(WS_URL_ENV) {
            debug!("WebSocket URL overridden by {}", WS_URL_ENV);
            self.ws_base_url = url;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.typing_window_ms == 0 {
            return Err(anyhow!("typing_window_ms must be positive"));
        }
        if self.send_timeout_ms == 0 {
            return Err(anyhow!("send_timeout_ms must be positive"));
        }
        if self.story_duration_ms == 0 {
            return Err(anyhow!("story_duration_ms must be positive"));
        }
        if !(self.dismiss_threshold_px > 0.0) {
            return Err(anyhow!("dismiss_threshold_px must be positive"));
        }
        Ok(())
    }
}

pub fn set_config_dir_override(dir: PathBuf) {
    let _ = CONFIG_DIR_OVERRIDE.set(dir);
}

pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE.get() {
        return Ok(dir.clone());
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("glimpse");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}
