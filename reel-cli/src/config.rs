use crate::error::{CliError, Result};
use playback_engine::PlayerConfig;
use playback_engine::history::DEFAULT_MAX_ENTRIES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stream_sources::ResolverConfig;
use tracing::debug;

const APP_DIR: &str = "reel";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub colored: bool,
    pub history: HistoryConfig,
    pub resolver: ResolverConfig,
    pub player: PlayerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            colored: true,
            history: HistoryConfig::default(),
            resolver: ResolverConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Where progress entries are stored. Defaults to the platform data directory.
    pub dir: Option<PathBuf>,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl HistoryConfig {
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| CliError::config("no data directory on this platform")),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Overwrite the config file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Self::default().show()?)?;
        Ok(())
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, backend: Option<String>, timeout: Option<u64>, no_color: bool) -> Self {
        if let Some(base_url) = backend {
            self.resolver.base_url = base_url;
        }
        if let Some(secs) = timeout {
            self.resolver.request_timeout_secs = secs;
        }
        if no_color {
            self.colored = false;
        }
        self
    }
}

fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(CONFIG_FILE))
        .ok_or_else(|| CliError::config("no config directory on this platform"))
}
