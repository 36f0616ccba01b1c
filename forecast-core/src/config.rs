use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::{Language, Units};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Provider endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Upper bound for a single HTTP call.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Cache lifetimes. The per-endpoint values override `ttl_secs` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            current_ttl_secs: None,
            forecast_ttl_secs: None,
        }
    }
}

/// Where the credential resolver looks after explicit input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub env_var: String,
    /// Defaults to `secrets.toml` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets_file: Option<PathBuf>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: DEFAULT_API_KEY_ENV.to_string(),
            secrets_file: None,
        }
    }
}

/// Presentation defaults used when the caller does not specify them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub city: String,
    pub units: Units,
    pub language: Language,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            city: "Almaty".to_string(),
            units: Units::default(),
            language: Language::default(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [api]
/// timeout_secs = 10
///
/// [cache]
/// ttl_secs = 600
/// forecast_ttl_secs = 1800
///
/// [defaults]
/// city = "Paris"
/// units = "metric"
/// language = "en"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub credentials: CredentialConfig,
    pub defaults: DefaultsConfig,
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "forecast", "forecast-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path to the secrets file: the configured one, or `secrets.toml` in the
    /// platform config directory.
    pub fn secrets_file_path(&self) -> Result<PathBuf> {
        match &self.credentials.secrets_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.config_dir().join("secrets.toml")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn current_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.cache.current_ttl_secs.unwrap_or(self.cache.ttl_secs))
    }

    pub fn forecast_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.cache.forecast_ttl_secs.unwrap_or(self.cache.ttl_secs))
    }
}

fn ttl_from_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
