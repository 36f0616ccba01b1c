//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - API key resolution (explicit input, environment, secrets file)
//! - The OpenWeather client for current conditions and the 5-day/3-hour forecast
//! - A TTL cache around provider calls with an injectable clock
//! - Normalization of forecasts into chart series and table rows
//! - [`WeatherService`], the boundary presenters call
//!
//! It is used by `forecast-cli`, but can also be reused by other presenters.

pub mod cache;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod service;

pub use cache::{CacheKey, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use credential::{CredentialResolver, store_secret};
pub use error::{ErrorKind, WeatherError};
pub use model::{
    City, Credential, CurrentWeather, Forecast, ForecastEntry, ForecastRow, ForecastSeries,
    Language, LocationQuery, SeriesPoint, Units,
};
pub use normalize::normalize;
pub use provider::{Endpoint, WeatherProvider, openweather::OpenWeatherClient};
pub use service::{CacheTtl, WeatherService};
