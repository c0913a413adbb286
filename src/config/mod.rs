//! # Configuration Management Module
//!
//! Roomkeeper reads a single TOML file with three sections:
//!
//! - [`EditorConfig`] - Save debounce, error banner lifetime, undo depth, room capacity
//! - [`StorageConfig`] - Where the sled database lives
//! - [`LoggingConfig`] - Log level plus optional general and security log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roomkeeper::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("roomkeeper.toml").await?;
//!     println!("debounce: {}ms", config.editor.debounce_ms);
//!
//!     Config::create_default("roomkeeper.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [editor]
//! debounce_ms = 2000
//! error_clear_ms = 5000
//! max_undo = 10
//! room_item_limit = 50
//!
//! [storage]
//! data_dir = "./data"
//! max_script_bytes = 262144
//!
//! [logging]
//! level = "info"
//! file = "roomkeeper.log"
//! security_file = "roomkeeper-security.log"
//! ```
//!
//! Every `[editor]` key is optional; missing keys take the defaults shown.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::editor::types::{MAX_UNDO, ROOM_ITEM_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Quiet period after the last edit before a save is issued.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long a save error stays visible.
    #[serde(default = "default_error_clear_ms")]
    pub error_clear_ms: u64,
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,
    #[serde(default = "default_room_item_limit")]
    pub room_item_limit: usize,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_error_clear_ms() -> u64 {
    5000
}

fn default_max_undo() -> usize {
    MAX_UNDO
}

fn default_room_item_limit() -> usize {
    ROOM_ITEM_LIMIT
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            error_clear_ms: default_error_clear_ms(),
            max_undo: default_max_undo(),
            room_item_limit: default_room_item_limit(),
        }
    }
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn error_clear(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(anyhow!("editor.debounce_ms must be greater than zero"));
        }
        if self.max_undo == 0 {
            return Err(anyhow!("editor.max_undo must be at least 1"));
        }
        if self.room_item_limit == 0 {
            return Err(anyhow!("editor.room_item_limit must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Upper bound for `apply --script` files.
    #[serde(default = "default_max_script_bytes")]
    pub max_script_bytes: usize,
}

fn default_max_script_bytes() -> usize {
    256 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.editor.validate()?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Directory holding the sled database.
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.storage.data_dir).join("roomkeeper")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            editor: EditorConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                max_script_bytes: default_max_script_bytes(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("roomkeeper.log".to_string()),
                security_file: Some("roomkeeper-security.log".to_string()),
            },
        }
    }
}
