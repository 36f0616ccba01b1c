use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{fmt::Debug, sync::Arc};

use crate::{
    Config,
    error::WeatherError,
    model::{Credential, CurrentWeather, Forecast, LocationQuery},
    provider::openweather::OpenWeatherClient,
};

pub mod openweather;

/// The two provider operations that are fetched and cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Current,
    Forecast,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Current => "current",
            Endpoint::Forecast => "forecast",
        }
    }

    /// Path segment below the provider base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Current => "weather",
            Endpoint::Forecast => "forecast",
        }
    }

    pub const fn all() -> &'static [Endpoint] {
        &[Endpoint::Current, Endpoint::Forecast]
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only access to a weather provider. Implementations never retry.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch_current(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<CurrentWeather, WeatherError>;

    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<Forecast, WeatherError>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let client = OpenWeatherClient::new(config.api.base_url.clone(), config.request_timeout())?;
    Ok(Arc::new(client))
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
}

/// Map a non-success status to the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str, city: &str) -> WeatherError {
    let message = provider_message(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WeatherError::InvalidCredential {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => WeatherError::UnknownLocation {
            city: city.to_string(),
            message,
        },
        _ => WeatherError::transient(format!("HTTP {status}: {message}")),
    }
}

/// The provider's `message` field when the error body is JSON, otherwise the
/// raw body, shortened.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| truncate_body(body))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
