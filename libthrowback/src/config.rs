//! Configuration management for Throwback
//!
//! Every setting has a built-in default, so the config file is optional.
//! Command-line flags override whatever is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::caption::DEFAULT_ELLIPSIS;
use crate::error::{ConfigError, Result};
use crate::types::{Platform, PlatformSelection};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub selection: SelectionConfig,
    pub caption: CaptionConfig,
    pub publish: PublishConfig,
}

/// File locations; relative paths resolve against the working directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub manifest: String,
    pub images_dir: String,
    pub history: String,
    /// Older history files read when `history` does not exist yet
    pub legacy_history: Vec<String>,
    pub twitter_auth: String,
    pub bluesky_auth: String,
    pub twitter_template: Option<String>,
    pub bluesky_template: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manifest: "Rin_Covers/manifest.json".to_string(),
            images_dir: "Rin_Covers".to_string(),
            history: crate::history::DEFAULT_HISTORY_FILE.to_string(),
            legacy_history: crate::history::LEGACY_HISTORY_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            twitter_auth: "twitter_auth.json".to_string(),
            bluesky_auth: "bluesky_auth.json".to_string(),
            twitter_template: None,
            bluesky_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Days a set must rest before it can be posted again
    pub threshold_days: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { threshold_days: 90 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub ellipsis: String,
    pub twitter_limit: usize,
    pub bluesky_limit: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            ellipsis: DEFAULT_ELLIPSIS.to_string(),
            twitter_limit: Platform::Twitter.character_limit(),
            bluesky_limit: Platform::Bluesky.character_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub platforms: PlatformSelection,
    pub max_image_mb: u64,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            platforms: PlatformSelection::Both,
            max_image_mb: 5,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// `explicit` (from `--config`) wins over `THROWBACK_CONFIG`, which wins
    /// over the XDG default. A missing default file yields the built-in
    /// defaults; a missing explicitly named file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (expand_path(&path.to_string_lossy()), true),
            None => match std::env::var("THROWBACK_CONFIG") {
                Ok(path) => (expand_path(&path), true),
                Err(_) => (resolve_config_path()?, false),
            },
        };

        if !path.exists() && !required {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values no run could work with
    pub fn validate(&self) -> Result<()> {
        let ellipsis_len = self.caption.ellipsis.chars().count();
        for (name, limit) in [
            ("caption.twitter_limit", self.caption.twitter_limit),
            ("caption.bluesky_limit", self.caption.bluesky_limit),
        ] {
            if limit <= ellipsis_len {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be greater than the ellipsis length ({}), got {}",
                    name, ellipsis_len, limit
                ))
                .into());
            }
        }
        if self.publish.max_image_mb == 0 {
            return Err(ConfigError::InvalidValue("publish.max_image_mb must be at least 1".to_string()).into());
        }
        if self.publish.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("publish.timeout_secs must be at least 1".to_string()).into());
        }
        Ok(())
    }
}

/// Resolve the default configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("throwback").join("config.toml"))
}

/// Expand `~` and `$VARS` in a configured path
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}
