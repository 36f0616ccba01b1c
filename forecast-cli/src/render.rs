//! Plain-text rendering of pipeline results.
//!
//! Everything here is presentation: label localization, number formatting,
//! sparkline charts and the forecast table. No I/O.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use forecast_core::{
    CurrentWeather, ErrorKind, ForecastSeries, Language, SeriesPoint, Units, WeatherError,
};

/// UI strings for one language.
#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub current_title: &'static str,
    pub forecast_title: &'static str,
    pub table_title: &'static str,
    pub feels_like: &'static str,
    pub humidity: &'static str,
    pub wind: &'static str,
    pub temperature_chart: &'static str,
    pub humidity_chart: &'static str,
    pub wind_chart: &'static str,
    pub col_time: &'static str,
    pub col_temperature: &'static str,
    pub col_feels_like: &'static str,
    pub col_humidity: &'static str,
    pub col_wind: &'static str,
    pub col_description: &'static str,
    pub min: &'static str,
    pub max: &'static str,
    pub source: &'static str,
    pub no_data: &'static str,
}

const RU: Labels = Labels {
    current_title: "Текущая погода",
    forecast_title: "Прогноз (5 дней / 3 часа)",
    table_title: "Таблица прогноза",
    feels_like: "Ощущается как",
    humidity: "Влажность",
    wind: "Ветер",
    temperature_chart: "Температура по времени",
    humidity_chart: "Влажность по времени",
    wind_chart: "Скорость ветра по времени",
    col_time: "Время",
    col_temperature: "Температура",
    col_feels_like: "Ощущается",
    col_humidity: "Влажность, %",
    col_wind: "Ветер",
    col_description: "Описание",
    min: "мин",
    max: "макс",
    source: "Источник данных: OpenWeather.",
    no_data: "Нет данных прогноза.",
};

const EN: Labels = Labels {
    current_title: "Current weather",
    forecast_title: "Forecast (5 days / 3 hours)",
    table_title: "Forecast table",
    feels_like: "Feels like",
    humidity: "Humidity",
    wind: "Wind",
    temperature_chart: "Temperature over time",
    humidity_chart: "Humidity over time",
    wind_chart: "Wind speed over time",
    col_time: "Time",
    col_temperature: "Temperature",
    col_feels_like: "Feels like",
    col_humidity: "Humidity, %",
    col_wind: "Wind",
    col_description: "Description",
    min: "min",
    max: "max",
    source: "Data source: OpenWeather.",
    no_data: "No forecast data.",
};

impl Labels {
    pub fn for_language(language: Language) -> &'static Labels {
        match language {
            Language::Ru => &RU,
            Language::En => &EN,
        }
    }
}

fn wind_unit(units: Units, language: Language) -> &'static str {
    match (units, language) {
        (Units::Metric, Language::Ru) => "м/с",
        _ => units.wind_speed_unit(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn current_block(current: &CurrentWeather, units: Units, language: Language) -> String {
    let labels = Labels::for_language(language);
    let temp = units.temperature_symbol();
    let wind = wind_unit(units, language);

    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", labels.current_title);
    let _ = writeln!(out, "{}", current.location_name);
    let _ = writeln!(
        out,
        "{:.1} {temp}  ({} {:.1} {temp})",
        current.temperature, labels.feels_like, current.feels_like
    );
    let _ = writeln!(out, "{}: {}%", labels.humidity, current.humidity);
    let _ = writeln!(out, "{}: {:.1} {wind}", labels.wind, current.wind_speed);
    let _ = writeln!(out, "{}  [{}]", capitalize(&current.condition_text), current.icon_url());
    out
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One bar per value, scaled between the series' min and max.
pub fn sparkline(values: &[f64]) -> String {
    let Some((min, max)) = min_max(values) else {
        return String::new();
    };

    let span = max - min;
    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                return BARS[BARS.len() / 2];
            }
            let idx = ((v - min) / span * (BARS.len() - 1) as f64).round() as usize;
            BARS[idx.min(BARS.len() - 1)]
        })
        .collect()
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn short_time(ts: DateTime<Utc>) -> String {
    ts.format("%m-%d %H:%M").to_string()
}

fn chart(title: &str, unit: &str, points: &[SeriesPoint], labels: &Labels) -> String {
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();

    let mut out = String::new();
    let _ = writeln!(out, "{title} ({unit})");
    if let (Some(first), Some(last), Some((lo, hi))) =
        (points.first(), points.last(), min_max(&values))
    {
        let _ = writeln!(out, "  {}", sparkline(&values));
        let _ = writeln!(
            out,
            "  {} .. {}   {} {lo:.1}, {} {hi:.1}",
            short_time(first.timestamp),
            short_time(last.timestamp),
            labels.min,
            labels.max,
        );
    }
    out
}

pub fn forecast_charts(series: &ForecastSeries, units: Units, language: Language) -> String {
    let labels = Labels::for_language(language);

    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", labels.forecast_title);
    if series.is_empty() {
        let _ = writeln!(out, "{}", labels.no_data);
        return out;
    }

    out.push_str(&chart(
        labels.temperature_chart,
        units.temperature_symbol(),
        &series.temperature,
        labels,
    ));
    out.push_str(&chart(labels.humidity_chart, "%", &series.humidity, labels));
    out.push_str(&chart(
        labels.wind_chart,
        wind_unit(units, language),
        &series.wind_speed,
        labels,
    ));
    out
}

pub fn forecast_table(series: &ForecastSeries, units: Units, language: Language) -> String {
    let labels = Labels::for_language(language);
    let temp = units.temperature_symbol();
    let wind = wind_unit(units, language);

    let headers = [
        labels.col_time.to_string(),
        format!("{}, {temp}", labels.col_temperature),
        format!("{}, {temp}", labels.col_feels_like),
        labels.col_humidity.to_string(),
        format!("{}, {wind}", labels.col_wind),
        labels.col_description.to_string(),
    ];

    let rows: Vec<[String; 6]> = series
        .table
        .iter()
        .map(|row| {
            [
                row.label.clone(),
                format!("{:.1}", row.temperature),
                format!("{:.1}", row.feels_like),
                row.humidity.to_string(),
                format!("{:.1}", row.wind_speed),
                row.description.clone(),
            ]
        })
        .collect();

    let mut widths = headers.clone().map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", labels.table_title);
    write_row(&mut out, &headers, &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }
    out
}

fn write_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

pub fn source_caption(language: Language) -> &'static str {
    Labels::for_language(language).source
}

/// English headlines come from the error itself.
fn error_headline(err: &WeatherError, language: Language) -> &'static str {
    match language {
        Language::En => err.user_message(),
        Language::Ru => match err.kind() {
            ErrorKind::NoCredential => {
                "Укажите API ключ OpenWeather: --api-key, --ask-key, переменная окружения или `forecast configure`."
            }
            ErrorKind::InvalidCredential => "API ключ отклонён. Проверьте ключ.",
            ErrorKind::UnknownLocation => "Город не найден. Проверьте название города.",
            ErrorKind::Api { retryable: true } => "Сервис погоды временно недоступен.",
            ErrorKind::Api { retryable: false } | ErrorKind::MalformedForecast => {
                "Сервис погоды вернул некорректные данные."
            }
        },
    }
}

fn retry_hint(language: Language) -> &'static str {
    match language {
        Language::Ru => "Попробуйте ещё раз через несколько секунд.",
        Language::En => "Please try again in a few seconds.",
    }
}

/// Localized headline, the technical detail, and a retry hint only when a
/// retry can help.
pub fn error_report(err: &WeatherError, language: Language) -> String {
    let kind = err.kind();

    let mut out = String::new();
    let _ = writeln!(out, "{}", error_headline(err, language));
    if kind != ErrorKind::NoCredential {
        let _ = writeln!(out, "  {err}");
    }
    if kind.offers_retry() {
        let _ = writeln!(out, "{}", retry_hint(language));
    }
    out.trim_end().to_string()
}
