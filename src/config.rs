use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::DEFAULT_API_URL;

pub const API_URL_ENV: &str = "OUTREACH_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend service.
    pub api_url: String,
    /// How often the board re-fetches completed records.
    pub refresh_interval_secs: u64,
    /// Enrichment can take minutes while the backend scrapes, so this is generous.
    pub request_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_interval_secs: 60,
            request_timeout_secs: 120,
            log_file: None,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `OUTREACH_API_URL`, then `api_url_flag`.
    pub fn load(path: Option<&Path>, api_url_flag: Option<&str>) -> Result<(Self, PathBuf)> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_path(),
        };

        let mut config = Self::from_file(&path)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        if let Some(url) = api_url_flag {
            config.api_url = url.to_string();
        }

        config.validate()?;
        Ok((config, path))
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(self.api_url.trim())
            .with_context(|| format!("Invalid api_url '{}'", self.api_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(anyhow!(
                "api_url must be http or https, got '{}'",
                url.scheme()
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(anyhow!("refresh_interval_secs must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(default_log_path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render config")
    }
}

pub fn default_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "outreach") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("outreach.toml"),
    }
}

fn default_log_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "outreach") {
        Some(dirs) => dirs.data_dir().join("outreach.log"),
        None => PathBuf::from("outreach.log"),
    }
}
