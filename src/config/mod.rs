use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Defaults for every run; CLI flags take precedence over these
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred transcript language code
    pub language: String,

    /// Seconds to wait between saved videos, and the backoff base
    pub delay: f64,

    /// Attempts per video when rate limited
    pub max_retries: u32,

    /// Fall back to a headless browser when the caption API fails
    pub browser_fallback: bool,

    /// Run the fallback browser without a window
    pub headless: bool,

    /// Directory for playlist transcripts
    pub output_dir: PathBuf,

    /// yt-dlp binary used for titles and playlists
    pub yt_dlp_path: String,

    /// Timeout for caption API requests, in seconds
    pub request_timeout_secs: u64,

    /// Timeout for title lookups, in seconds
    pub title_timeout_secs: u64,

    /// Replaces the built-in user agent pool when non-empty
    pub user_agents: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            delay: 2.0,
            max_retries: 3,
            browser_fallback: true,
            headless: true,
            output_dir: PathBuf::from("transcripts"),
            yt_dlp_path: "yt-dlp".to_string(),
            request_timeout_secs: 30,
            title_timeout_secs: 10,
            user_agents: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the usual locations, or defaults.
    ///
    /// Nothing is ever written back.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path(),
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// First existing config file, if any
    fn config_path() -> Option<PathBuf> {
        // Current directory first for easy per-project overrides
        let local_config = PathBuf::from("transcript.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        let user_config = dirs::config_dir()?.join("yt-transcript").join("config.yaml");
        user_config.exists().then_some(user_config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if Duration::try_from_secs_f64(self.delay).is_err() {
            anyhow::bail!("delay must be a non-negative number of seconds");
        }

        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }

        if self.language.trim().is_empty() {
            anyhow::bail!("language must not be empty");
        }

        Ok(())
    }
}
