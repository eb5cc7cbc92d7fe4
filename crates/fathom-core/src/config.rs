//! Configuration management for fathom.
//!
//! Loads configuration from ${FATHOM_HOME}/config.toml with sensible
//! defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fathom_types::conversation::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod paths {
    //! Path resolution for fathom configuration and data directories.
    //!
    //! FATHOM_HOME resolution order:
    //! 1. FATHOM_HOME environment variable (if set)
    //! 2. ~/.config/fathom (default)

    use std::path::PathBuf;

    /// Returns the fathom home directory.
    ///
    /// Checks FATHOM_HOME env var first, falls back to ~/.config/fathom
    pub fn fathom_home() -> PathBuf {
        if let Ok(home) = std::env::var("FATHOM_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("fathom"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        fathom_home().join("config.toml")
    }

    /// Returns the path to the conversations directory.
    pub fn conversations_dir() -> PathBuf {
        fathom_home().join("conversations")
    }

    /// Returns the path to the logs directory.
    pub fn logs_dir() -> PathBuf {
        fathom_home().join("logs")
    }
}

/// Main configuration structure.
///
/// These knobs are forwarded to the backend in every outbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum plan refinement iterations per request
    pub max_plan_iterations: u32,

    /// Maximum steps a research plan may contain
    pub max_step_num: u32,

    /// Skip the plan-review interrupt and start research immediately
    pub auto_accepted_plan: bool,

    /// Run a background web investigation before planning
    pub enable_background_investigation: bool,

    /// Optional inline system prompt override
    pub system_prompt: Option<String>,

    /// Optional tool configuration forwarded verbatim to the backend
    pub tool_settings: Option<Value>,

    /// Mode used when the caller does not specify one
    pub default_mode: Mode,
}

impl Config {
    const DEFAULT_MAX_PLAN_ITERATIONS: u32 = 1;
    const DEFAULT_MAX_STEP_NUM: u32 = 3;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_plan_iterations: Self::DEFAULT_MAX_PLAN_ITERATIONS,
            max_step_num: Self::DEFAULT_MAX_STEP_NUM,
            auto_accepted_plan: false,
            enable_background_investigation: true,
            system_prompt: None,
            tool_settings: None,
            default_mode: Mode::Research,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.max_plan_iterations, 1);
        assert_eq!(config.max_step_num, 3);
        assert!(!config.auto_accepted_plan);
        assert!(config.enable_background_investigation);
        assert_eq!(config.default_mode, Mode::Research);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "max_step_num = 5\ndefault_mode = \"chat\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_step_num, 5);
        assert_eq!(config.default_mode, Mode::Chat);
        assert_eq!(config.max_plan_iterations, 1);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "max_step_num = \"not a number\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
