//! API key resolution.
//!
//! Sources are consulted in priority order and the first non-blank value
//! wins:
//! 1. a value supplied explicitly by the caller (interactive input),
//! 2. an environment variable,
//! 3. a TOML secrets file with a single `OPENWEATHER_API_KEY` field.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::{Config, DEFAULT_API_KEY_ENV},
    error::WeatherError,
    model::Credential,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(rename = "OPENWEATHER_API_KEY", skip_serializing_if = "Option::is_none")]
    openweather_api_key: Option<String>,
}

#[derive(Clone)]
pub struct CredentialResolver {
    explicit: Option<String>,
    env_var: String,
    secrets_file: Option<PathBuf>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("explicit", &self.explicit.as_ref().map(|_| "***"))
            .field("env_var", &self.env_var)
            .field("secrets_file", &self.secrets_file)
            .finish()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self {
            explicit: None,
            env_var: DEFAULT_API_KEY_ENV.to_string(),
            secrets_file: None,
        }
    }
}

impl CredentialResolver {
    pub fn new(
        explicit: Option<String>,
        env_var: impl Into<String>,
        secrets_file: Option<PathBuf>,
    ) -> Self {
        Self {
            explicit,
            env_var: env_var.into(),
            secrets_file,
        }
    }

    /// Build a resolver from the configured sources plus an optional
    /// explicitly supplied key.
    pub fn from_config(config: &Config, explicit: Option<String>) -> anyhow::Result<Self> {
        Ok(Self::new(
            explicit,
            config.credentials.env_var.clone(),
            Some(config.secrets_file_path()?),
        ))
    }

    /// Replace the interactively supplied key, e.g. after the user edits it.
    pub fn set_explicit(&mut self, explicit: Option<String>) {
        self.explicit = explicit;
    }

    pub fn resolve(&self) -> Result<Credential, WeatherError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment lookup.
    pub fn resolve_with<F>(&self, env: F) -> Result<Credential, WeatherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_blank(self.explicit.clone()) {
            tracing::debug!("using explicitly supplied API key");
            return Ok(Credential::new(key));
        }

        if let Some(key) = non_blank(env(&self.env_var)) {
            tracing::debug!(env_var = %self.env_var, "using API key from environment");
            return Ok(Credential::new(key));
        }

        if let Some(key) = self.secrets_file.as_deref().and_then(read_secret) {
            tracing::debug!("using API key from secrets file");
            return Ok(Credential::new(key));
        }

        Err(WeatherError::NoCredential)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Missing, unreadable or unparseable secrets files count as absent.
fn read_secret(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read secrets file: {e}");
            return None;
        }
    };

    match toml::from_str::<SecretsFile>(&contents) {
        Ok(secrets) => non_blank(secrets.openweather_api_key),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to parse secrets file: {e}");
            None
        }
    }
}

/// Write `api_key` into the secrets file at `path`, creating parent
/// directories as needed.
pub fn store_secret(path: &Path, api_key: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create secrets directory: {}", parent.display())
        })?;
    }

    let secrets = SecretsFile {
        openweather_api_key: Some(api_key.trim().to_string()),
    };
    let toml = toml::to_string_pretty(&secrets).context("Failed to serialize secrets to TOML")?;

    fs::write(path, toml)
        .with_context(|| format!("Failed to write secrets file: {}", path.display()))?;

    Ok(())
}
