//! Error taxonomy shared by every stage of the pipeline.
//!
//! Errors are propagated unchanged from the credential resolver and the
//! weather client up to the presenter. Presenters should branch on
//! [`WeatherError::kind`] rather than on message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("No OpenWeather API key found in input, environment or secrets file")]
    NoCredential,

    #[error("OpenWeather rejected the API key (HTTP {status}): {message}")]
    InvalidCredential { status: u16, message: String },

    #[error("OpenWeather does not know the location '{city}': {message}")]
    UnknownLocation { city: String, message: String },

    #[error("OpenWeather request failed: {message}")]
    Api { retryable: bool, message: String },

    #[error("Malformed forecast: {reason}")]
    MalformedForecast { reason: String },
}

/// Coarse classification used by presenters to pick a message and decide
/// whether to offer a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoCredential,
    InvalidCredential,
    UnknownLocation,
    Api { retryable: bool },
    MalformedForecast,
}

impl ErrorKind {
    /// Only transient provider failures are worth a bare retry.
    pub fn offers_retry(self) -> bool {
        matches!(self, ErrorKind::Api { retryable: true })
    }
}

impl WeatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WeatherError::NoCredential => ErrorKind::NoCredential,
            WeatherError::InvalidCredential { .. } => ErrorKind::InvalidCredential,
            WeatherError::UnknownLocation { .. } => ErrorKind::UnknownLocation,
            WeatherError::Api { retryable, .. } => ErrorKind::Api {
                retryable: *retryable,
            },
            WeatherError::MalformedForecast { .. } => ErrorKind::MalformedForecast,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().offers_retry()
    }

    /// Returns a short, actionable message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NoCredential => {
                "No API key configured. Pass --api-key or --ask-key, set OPENWEATHER_API_KEY, or run `forecast configure`."
            }
            ErrorKind::InvalidCredential => {
                "The API key was rejected. Check the key and try another."
            }
            ErrorKind::UnknownLocation => "City not found. Check the spelling of the city name.",
            ErrorKind::Api { retryable: true } => {
                "The weather service is temporarily unavailable."
            }
            ErrorKind::Api { retryable: false } | ErrorKind::MalformedForecast => {
                "The weather service returned data that could not be understood."
            }
        }
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        WeatherError::Api {
            retryable: true,
            message: message.into(),
        }
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        WeatherError::Api {
            retryable: false,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        WeatherError::MalformedForecast {
            reason: reason.into(),
        }
    }
}
