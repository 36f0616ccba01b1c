//! The render boundary: current conditions and forecast series behind one cache.

use chrono::Duration;
use std::sync::Arc;

use crate::{
    Config,
    cache::{CacheKey, TtlCache},
    clock::{Clock, SystemClock},
    credential::CredentialResolver,
    error::WeatherError,
    model::{Credential, CurrentWeather, Forecast, ForecastSeries, LocationQuery},
    normalize::normalize,
    provider::{Endpoint, WeatherProvider, provider_from_config},
};

/// How long each endpoint's responses stay fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub current: Duration,
    pub forecast: Duration,
}

impl CacheTtl {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            current: ttl,
            forecast: ttl,
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self::uniform(Duration::minutes(10))
    }
}

#[derive(Debug)]
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    credentials: CredentialResolver,
    current: TtlCache<CacheKey, CurrentWeather>,
    forecast: TtlCache<CacheKey, Forecast>,
    ttl: CacheTtl,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        credentials: CredentialResolver,
        clock: Arc<dyn Clock>,
        ttl: CacheTtl,
    ) -> Self {
        Self {
            provider,
            credentials,
            current: TtlCache::new(clock.clone()),
            forecast: TtlCache::new(clock),
            ttl,
        }
    }

    /// Production wiring: OpenWeather client, configured credential sources,
    /// system clock and configured TTLs.
    pub fn from_config(config: &Config, explicit_key: Option<String>) -> anyhow::Result<Self> {
        let provider = provider_from_config(config)?;
        let credentials = CredentialResolver::from_config(config, explicit_key)?;
        let ttl = CacheTtl {
            current: config.current_ttl(),
            forecast: config.forecast_ttl(),
        };

        Ok(Self::new(provider, credentials, Arc::new(SystemClock), ttl))
    }

    /// Cached entries survive a key change; only new fetches use the new key.
    pub fn credentials_mut(&mut self) -> &mut CredentialResolver {
        &mut self.credentials
    }

    /// Resolves the API key. Presenters rendering several sections call this
    /// once and pass the result to the `*_with` operations.
    pub fn credential(&self) -> Result<Credential, WeatherError> {
        self.credentials.resolve()
    }

    pub async fn get_current(&self, query: &LocationQuery) -> Result<CurrentWeather, WeatherError> {
        let credential = self.credential()?;
        self.get_current_with(query, &credential).await
    }

    pub async fn get_current_with(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<CurrentWeather, WeatherError> {
        let key = CacheKey::new(Endpoint::Current, query);

        self.current
            .cached(key, self.ttl.current, || {
                self.provider.fetch_current(query, credential)
            })
            .await
    }

    /// Fetches (or reuses) the forecast and normalizes it. A malformed
    /// forecast fails the whole call.
    pub async fn get_forecast_series(
        &self,
        query: &LocationQuery,
    ) -> Result<ForecastSeries, WeatherError> {
        let credential = self.credential()?;
        self.get_forecast_series_with(query, &credential).await
    }

    pub async fn get_forecast_series_with(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<ForecastSeries, WeatherError> {
        let key = CacheKey::new(Endpoint::Forecast, query);

        let forecast = self
            .forecast
            .cached(key, self.ttl.forecast, || {
                self.provider.fetch_forecast(query, credential)
            })
            .await?;

        normalize(&forecast.entries)
    }
}
