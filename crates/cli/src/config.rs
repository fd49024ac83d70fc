//! Application configuration, persisted as JSON.

use std::path::PathBuf;

use chat_core::SessionOptions;
use serde::{Deserialize, Serialize};

/// Global configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when a command is given no path.
    #[serde(default)]
    pub default_model: Option<PathBuf>,
    /// Overrides applied on top of the per-model defaults.
    #[serde(default)]
    pub session: SessionOptions,
}

impl AppConfig {
    /// Platform config directory: `~/.config/ondevice-chat/`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ondevice-chat")
    }

    fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// SQLite file holding saved benchmark runs.
    pub fn db_path() -> PathBuf {
        Self::config_dir().join("bench.db")
    }

    /// Load from disk, or return defaults if the file doesn't exist.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::config_file();
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        std::fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_file(), data)?;
        Ok(())
    }

    /// Apply `config set <key> <value>`. `none` clears an optional value.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let clear = value.eq_ignore_ascii_case("none");
        match key {
            "default_model" => {
                self.default_model = (!clear).then(|| PathBuf::from(value));
            }
            "threads" => {
                self.session.threads = if clear { None } else { Some(value.parse()?) };
            }
            "seed" => {
                self.session.seed = if clear { None } else { Some(value.parse()?) };
            }
            "max_new_tokens" => {
                self.session.max_new_tokens = if clear { None } else { Some(value.parse()?) };
            }
            _ => anyhow::bail!("Unknown config key: {key}"),
        }
        Ok(())
    }
}
