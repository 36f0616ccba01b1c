use crate::{
    error::WeatherError,
    model::{ForecastEntry, ForecastRow, ForecastSeries, SeriesPoint},
};

/// Label format for table rows; matches the provider's `dt_txt`.
pub const ROW_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Projects forecast entries into chart series and table rows.
///
/// Entries are taken in the given order and never re-sorted. A timestamp that
/// does not strictly follow its predecessor fails the whole forecast, so no
/// partial chart is ever produced.
pub fn normalize(entries: &[ForecastEntry]) -> Result<ForecastSeries, WeatherError> {
    for (position, pair) in entries.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.timestamp <= prev.timestamp {
            return Err(WeatherError::malformed(format!(
                "entry {} at {} does not follow entry {} at {}",
                position + 1,
                next.timestamp,
                position,
                prev.timestamp,
            )));
        }
    }

    let point = |entry: &ForecastEntry, value: f64| SeriesPoint {
        timestamp: entry.timestamp,
        value,
    };

    Ok(ForecastSeries {
        temperature: entries.iter().map(|e| point(e, e.temperature)).collect(),
        humidity: entries.iter().map(|e| point(e, f64::from(e.humidity))).collect(),
        wind_speed: entries.iter().map(|e| point(e, e.wind_speed)).collect(),
        table: entries.iter().map(row).collect(),
    })
}

fn row(entry: &ForecastEntry) -> ForecastRow {
    ForecastRow {
        timestamp: entry.timestamp,
        label: entry.timestamp.format(ROW_LABEL_FORMAT).to_string(),
        temperature: entry.temperature,
        feels_like: entry.feels_like,
        humidity: entry.humidity,
        wind_speed: entry.wind_speed,
        description: entry.description.clone(),
    }
}
