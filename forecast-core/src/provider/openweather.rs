use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::error::Category;
use std::time::Duration;

use crate::{
    error::WeatherError,
    model::{City, Credential, CurrentWeather, Forecast, ForecastEntry, LocationQuery},
    provider::{Endpoint, WeatherProvider, classify_status},
};

/// Client for the OpenWeather 2.5 `weather` and `forecast` endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    /// `timeout` bounds each request, from connect to the last body byte.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenWeather HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(
        &self,
        endpoint: Endpoint,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<String, WeatherError> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        tracing::debug!(
            %endpoint,
            city = %query.city,
            units = %query.units,
            lang = %query.language,
            "requesting OpenWeather"
        );

        let res = self
            .http
            .get(&url)
            .query(&[
                ("q", query.city.as_str()),
                ("units", query.units.as_str()),
                ("lang", query.language.as_str()),
                ("appid", credential.expose()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(endpoint, "send request", e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| transport_error(endpoint, "read response body", e))?;

        tracing::debug!(%endpoint, %status, "OpenWeather responded");

        if !status.is_success() {
            return Err(classify_status(status, &body, &query.city));
        }

        Ok(body)
    }
}

/// Network-level failures are transient. The URL is dropped from the message
/// because it carries the API key.
fn transport_error(endpoint: Endpoint, action: &str, err: reqwest::Error) -> WeatherError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.without_url().to_string()
    };
    WeatherError::transient(format!("Failed to {action} for OpenWeather {endpoint}: {reason}"))
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch_current(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<CurrentWeather, WeatherError> {
        let body = self.get(Endpoint::Current, query, credential).await?;
        parse_current(&body)
    }

    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        credential: &Credential,
    ) -> Result<Forecast, WeatherError> {
        let body = self.get(Endpoint::Forecast, query, credential).await?;
        parse_forecast(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default)]
    name: String,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    sys: OwSys,
}

#[derive(Debug, Default, Deserialize)]
struct OwCity {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default)]
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

fn parse_current(body: &str) -> Result<CurrentWeather, WeatherError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body).map_err(|e| {
        WeatherError::contract(format!("Failed to parse OpenWeather current JSON: {e}"))
    })?;

    let condition = parsed.weather.into_iter().next().ok_or_else(|| {
        WeatherError::contract("OpenWeather current response has no weather condition")
    })?;

    let condition_text = if condition.description.trim().is_empty() {
        condition.main
    } else {
        condition.description
    };
    if condition_text.trim().is_empty() {
        return Err(WeatherError::contract(
            "OpenWeather current response has an empty condition",
        ));
    }

    let humidity = parsed.main.humidity;
    if humidity > 100 {
        return Err(WeatherError::contract(format!(
            "OpenWeather current humidity {humidity}% is out of range"
        )));
    }

    let observed_at = unix_to_utc(parsed.dt).ok_or_else(|| {
        WeatherError::contract(format!(
            "OpenWeather current timestamp {} is out of range",
            parsed.dt
        ))
    })?;

    let location_name = match parsed.sys.country.filter(|c| !c.is_empty()) {
        Some(country) => format!("{}, {}", parsed.name, country),
        None => parsed.name,
    };

    Ok(CurrentWeather {
        location_name,
        temperature: parsed.main.temp,
        feels_like: parsed.main.feels_like,
        humidity,
        wind_speed: parsed.wind.speed,
        condition_icon: condition.icon,
        condition_text,
        observed_at,
    })
}

/// Syntax errors are provider failures; well-formed JSON that breaks the
/// forecast shape is a malformed forecast.
fn parse_forecast(body: &str) -> Result<Forecast, WeatherError> {
    let parsed: OwForecastResponse = serde_json::from_str(body).map_err(|e| match e.classify() {
        Category::Data => WeatherError::malformed(format!(
            "OpenWeather forecast JSON has an unexpected shape: {e}"
        )),
        Category::Syntax | Category::Eof | Category::Io => {
            WeatherError::contract(format!("Failed to parse OpenWeather forecast JSON: {e}"))
        }
    })?;

    if parsed.list.is_empty() {
        return Err(WeatherError::malformed("Empty forecast list from API"));
    }

    let entries = parsed
        .list
        .into_iter()
        .enumerate()
        .map(|(position, entry)| forecast_entry(position, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Forecast {
        city: City {
            name: parsed.city.name,
            country: parsed.city.country,
        },
        entries,
    })
}

fn forecast_entry(position: usize, entry: OwForecastEntry) -> Result<ForecastEntry, WeatherError> {
    let timestamp = unix_to_utc(entry.dt).ok_or_else(|| {
        WeatherError::malformed(format!(
            "entry {position} has out-of-range timestamp {}",
            entry.dt
        ))
    })?;

    if entry.main.humidity > 100 {
        return Err(WeatherError::malformed(format!(
            "entry {position} has humidity {}% out of range",
            entry.main.humidity
        )));
    }

    let description = entry
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .unwrap_or_default();

    Ok(ForecastEntry {
        timestamp,
        temperature: entry.main.temp,
        feels_like: entry.main.feels_like,
        humidity: entry.main.humidity,
        wind_speed: entry.wind.speed,
        description,
    })
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn current_body() -> serde_json::Value {
        json!({
            "name": "Paris",
            "dt": 1_714_521_600,
            "main": { "temp": 18.5, "feels_like": 17.9, "humidity": 60, "pressure": 1012 },
            "wind": { "speed": 3.6, "deg": 250 },
            "weather": [
                { "id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d" }
            ],
            "sys": { "country": "FR" }
        })
    }

    fn forecast_body(count: usize) -> serde_json::Value {
        let list: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "dt": 1_714_521_600 + (i as i64) * 3 * 3600,
                    "main": { "temp": 12.0 + i as f64, "feels_like": 11.0, "humidity": 70 },
                    "wind": { "speed": 2.5 },
                    "weather": [{ "main": "Rain", "description": "light rain", "icon": "10d" }],
                    "dt_txt": "ignored"
                })
            })
            .collect();
        json!({
            "cod": "200",
            "cnt": count,
            "list": list,
            "city": { "name": "Paris", "country": "FR" }
        })
    }

    #[test]
    fn parses_current_observation() {
        let current = parse_current(&current_body().to_string()).unwrap();

        assert_eq!(current.location_name, "Paris, FR");
        assert_eq!(current.temperature, 18.5);
        assert_eq!(current.feels_like, 17.9);
        assert_eq!(current.humidity, 60);
        assert_eq!(current.wind_speed, 3.6);
        assert_eq!(current.condition_icon, "04d");
        assert_eq!(current.condition_text, "broken clouds");
        assert_eq!(current.observed_at.timestamp(), 1_714_521_600);
    }

    #[test]
    fn empty_description_falls_back_to_condition_group() {
        let mut body = current_body();
        body["weather"][0]["description"] = json!("");
        assert_eq!(parse_current(&body.to_string()).unwrap().condition_text, "Clouds");
    }

    #[test]
    fn current_without_country_uses_name_only() {
        let mut body = current_body();
        body.as_object_mut().unwrap().remove("sys");
        assert_eq!(parse_current(&body.to_string()).unwrap().location_name, "Paris");
    }

    #[test]
    fn current_missing_required_field_is_non_retryable() {
        let mut body = current_body();
        body["main"].as_object_mut().unwrap().remove("humidity");

        let err = parse_current(&body.to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api { retryable: false });
    }

    #[test]
    fn current_humidity_over_100_is_rejected() {
        let mut body = current_body();
        body["main"]["humidity"] = json!(140);
        assert_eq!(
            parse_current(&body.to_string()).unwrap_err().kind(),
            ErrorKind::Api { retryable: false }
        );
    }

    #[test]
    fn current_without_conditions_is_rejected() {
        let mut body = current_body();
        body["weather"] = json!([]);
        assert!(parse_current(&body.to_string()).is_err());
    }

    #[test]
    fn invalid_json_is_non_retryable() {
        let err = parse_current("<html>oops</html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api { retryable: false });

        let err = parse_forecast("{\"list\": [").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api { retryable: false });
    }

    #[test]
    fn parses_forty_forecast_entries_in_order() {
        let forecast = parse_forecast(&forecast_body(40).to_string()).unwrap();

        assert_eq!(forecast.entries.len(), 40);
        assert_eq!(forecast.city.name, "Paris");
        assert_eq!(forecast.city.country, "FR");
        assert_eq!(forecast.entries[1].temperature, 13.0);
        assert_eq!(forecast.entries[1].description, "light rain");
        assert_eq!(
            forecast.entries[1].timestamp - forecast.entries[0].timestamp,
            chrono::Duration::hours(3)
        );
    }

    #[test]
    fn forecast_entry_without_conditions_has_empty_description() {
        let mut body = forecast_body(2);
        body["list"][0].as_object_mut().unwrap().remove("weather");

        let forecast = parse_forecast(&body.to_string()).unwrap();
        assert_eq!(forecast.entries[0].description, "");
    }

    #[test]
    fn empty_forecast_list_is_malformed() {
        let err = parse_forecast(&forecast_body(0).to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedForecast);
    }

    #[test]
    fn forecast_missing_field_is_malformed() {
        let mut body = forecast_body(3);
        body["list"][2].as_object_mut().unwrap().remove("wind");

        let err = parse_forecast(&body.to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedForecast);
    }

    #[test]
    fn forecast_humidity_out_of_range_is_malformed() {
        let mut body = forecast_body(3);
        body["list"][1]["main"]["humidity"] = json!(101);

        let err = parse_forecast(&body.to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedForecast);
        assert!(err.to_string().contains("entry 1"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            OpenWeatherClient::new("http://localhost:1234/data/2.5/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/data/2.5");
    }
}
