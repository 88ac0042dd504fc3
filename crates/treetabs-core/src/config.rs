//! Tree configuration.
//!
//! Settings are read from `treetabs/config.toml` under the platform config
//! directory. A missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{TreeError, TreeResult};

/// Smallest indent unit the engine will ever shrink to, in pixels.
pub const HARD_MIN_INDENT: u32 = 3;

const CONFIG_DIR: &str = "treetabs";
const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default)]
    pub indent: IndentConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndentConfig {
    /// Indent per level when there is enough room, in pixels.
    pub base_indent: u32,
    /// Lower bound for the shrunk indent; never below [`HARD_MIN_INDENT`].
    pub min_indent: u32,
    /// Levels deeper than this are drawn at this level. `None` = no cap.
    pub max_tree_level: Option<u32>,
    /// Only count visible tabs when deciding whether to shrink.
    pub auto_shrink_only_for_visible: bool,
}

impl Default for IndentConfig {
    fn default() -> Self {
        IndentConfig {
            base_indent: 12,
            min_indent: HARD_MIN_INDENT,
            max_tree_level: None,
            auto_shrink_only_for_visible: true,
        }
    }
}

impl IndentConfig {
    /// Configured minimum, floored at [`HARD_MIN_INDENT`].
    #[must_use]
    pub fn effective_min_indent(&self) -> u32 {
        self.min_indent.max(HARD_MIN_INDENT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Debounce delay before recomputing indentation.
    pub indent_delay_ms: u64,
    /// Debounce delay before recomputing tab bar overflow.
    pub layout_delay_ms: u64,
    /// How long an internal move waits for its host confirmation.
    pub internal_move_ttl_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            indent_delay_ms: 100,
            layout_delay_ms: 10,
            internal_move_ttl_ms: 2_000,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn indent_delay(&self) -> Duration {
        Duration::from_millis(self.indent_delay_ms)
    }

    #[must_use]
    pub fn layout_delay(&self) -> Duration {
        Duration::from_millis(self.layout_delay_ms)
    }

    #[must_use]
    pub fn internal_move_ttl(&self) -> Duration {
        Duration::from_millis(self.internal_move_ttl_ms)
    }
}

/// What the per-tab counter shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterRole {
    /// Number of descendants.
    #[default]
    ContainedTabs,
    /// Number of descendants plus the tab itself.
    AllTabs,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub role: CounterRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Height of one tab row, in pixels.
    pub tab_height: u32,
    /// Sidebar size assumed until the first resize.
    pub initial_width: u32,
    pub initial_height: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            tab_height: 24,
            initial_width: 300,
            initial_height: 600,
        }
    }
}

impl TreeConfig {
    /// Loads the config from the default location, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> TreeResult<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads the config from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::Io` if the file cannot be read and
    /// `TreeError::Config` if it is not valid TOML.
    pub fn load_from(path: &Path) -> TreeResult<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|source| TreeError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the config to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::Io` on filesystem failures.
    pub fn save_to(&self, path: &Path) -> TreeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file location.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
