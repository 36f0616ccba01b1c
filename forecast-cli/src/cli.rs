use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use forecast_core::{
    Config, Language, LocationQuery, Units, WeatherError, WeatherService, store_secret,
};
use inquire::{Confirm, InquireError, Password, PasswordDisplayMode, Select, Text, required};
use std::{fmt::Write as _, process::ExitCode};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "forecast",
    version,
    about = "Current weather and 5-day forecast from OpenWeather"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and default city, units and language.
    Configure,

    /// Show current weather, forecast charts and the forecast table.
    Show {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show current weather only.
    Current {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show forecast charts.
    Series {
        #[command(flatten)]
        query: QueryArgs,

        /// Also print the forecast table.
        #[arg(long)]
        table: bool,
    },

    /// Prompt for a city, units and language repeatedly, reusing cached
    /// responses between rounds. Press Esc to quit.
    Session {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// City name; defaults to the configured city.
    pub city: Option<String>,

    /// metric or imperial.
    #[arg(long, value_parser = parse_units)]
    pub units: Option<Units>,

    /// Language of labels and condition descriptions: ru or en.
    #[arg(long = "lang", value_parser = parse_language)]
    pub language: Option<Language>,

    /// API key; takes priority over the environment and the secrets file.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Prompt for the API key with a hidden input field.
    #[arg(long, conflicts_with = "api_key")]
    pub ask_key: bool,
}

fn parse_units(s: &str) -> Result<Units, String> {
    Units::try_from(s).map_err(|e| e.to_string())
}

fn parse_language(s: &str) -> Result<Language, String> {
    Language::try_from(s).map_err(|e| e.to_string())
}

/// Which parts of the page to render.
#[derive(Debug, Clone, Copy)]
struct Sections {
    current: bool,
    charts: bool,
    table: bool,
}

impl Sections {
    const ALL: Sections = Sections {
        current: true,
        charts: true,
        table: true,
    };
}

impl Cli {
    /// Pipeline failures are reported inline per section and turn into a
    /// failing exit code; setup problems are returned as errors.
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Configure => configure().map(|()| ExitCode::SUCCESS),
            Command::Show { query } => show(query, Sections::ALL).await,
            Command::Current { query } => {
                let sections = Sections {
                    current: true,
                    charts: false,
                    table: false,
                };
                show(query, sections).await
            }
            Command::Series { query, table } => {
                let sections = Sections {
                    current: false,
                    charts: true,
                    table,
                };
                show(query, sections).await
            }
            Command::Session { query } => session(query).await.map(|()| ExitCode::SUCCESS),
        }
    }
}

fn cursor<T: PartialEq>(all: &[T], current: &T) -> usize {
    all.iter().position(|v| v == current).unwrap_or(0)
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message("Get one at openweathermap.org -> API keys")
        .prompt()?;
    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    let city = Text::new("Default city:")
        .with_default(&config.defaults.city)
        .with_validator(required!("City name must not be empty"))
        .prompt()?;

    let units = Select::new("Units:", Units::all().to_vec())
        .with_starting_cursor(cursor(Units::all(), &config.defaults.units))
        .prompt()?;

    let language = Select::new("Language:", Language::all().to_vec())
        .with_starting_cursor(cursor(Language::all(), &config.defaults.language))
        .prompt()?;

    config.defaults.city = city.trim().to_string();
    config.defaults.units = units;
    config.defaults.language = language;

    let secrets_path = config.secrets_file_path()?;
    store_secret(&secrets_path, &api_key)?;
    config.save()?;

    println!(
        "Saved configuration to {}",
        Config::config_file_path()?.display()
    );
    println!("Saved API key to {}", secrets_path.display());
    Ok(())
}

fn prompt_api_key() -> anyhow::Result<String> {
    Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Hidden)
        .prompt()
        .context("Failed to read API key")
}

fn explicit_key(args: &QueryArgs) -> anyhow::Result<Option<String>> {
    if args.ask_key {
        Ok(Some(prompt_api_key()?))
    } else {
        Ok(args.api_key.clone())
    }
}

/// Builds a query, refusing a blank city: the provider cannot geocode it and
/// no retry would help.
fn location_query(city: &str, units: Units, language: Language) -> anyhow::Result<LocationQuery> {
    let city = city.trim();
    if city.is_empty() {
        bail!("City name must not be empty");
    }
    Ok(LocationQuery::new(city, units, language))
}

fn query_from(args: &QueryArgs, config: &Config) -> anyhow::Result<LocationQuery> {
    location_query(
        args.city.as_deref().unwrap_or(&config.defaults.city),
        args.units.unwrap_or(config.defaults.units),
        args.language.unwrap_or(config.defaults.language),
    )
}

/// Output of one render cycle. Sections fail independently.
#[derive(Debug, Default)]
struct Page {
    body: String,
    errors: Vec<String>,
}

impl Page {
    fn print(&self) -> ExitCode {
        for error in &self.errors {
            eprintln!("{error}\n");
        }
        print!("{}", self.body);

        if self.errors.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Renders the requested sections with one credential resolution. A missing
/// credential fails the whole cycle before any request is made.
async fn render_page(
    service: &WeatherService,
    query: &LocationQuery,
    sections: Sections,
) -> Result<Page, WeatherError> {
    let credential = service.credential()?;
    let (units, language) = (query.units, query.language);
    let mut page = Page::default();

    if sections.current {
        match service.get_current_with(query, &credential).await {
            Ok(current) => {
                let _ = writeln!(
                    page.body,
                    "{}",
                    render::current_block(&current, units, language)
                );
            }
            Err(err) => page.errors.push(render::error_report(&err, language)),
        }
    }

    if sections.charts || sections.table {
        match service.get_forecast_series_with(query, &credential).await {
            Ok(series) => {
                if sections.charts {
                    let charts = render::forecast_charts(&series, units, language);
                    let _ = writeln!(page.body, "{charts}");
                }
                if sections.table {
                    let table = render::forecast_table(&series, units, language);
                    let _ = writeln!(page.body, "{table}");
                }
            }
            Err(err) => page.errors.push(render::error_report(&err, language)),
        }
    }

    let _ = writeln!(page.body, "{}", render::source_caption(language));
    Ok(page)
}

async fn show(args: QueryArgs, sections: Sections) -> anyhow::Result<ExitCode> {
    let config = Config::load()?;
    let query = query_from(&args, &config)?;
    let service = WeatherService::from_config(&config, explicit_key(&args)?)?;
    tracing::debug!(?query, "rendering");

    match render_page(&service, &query, sections).await {
        Ok(page) => Ok(page.print()),
        Err(err) => Err(report(err, query.language)),
    }
}

fn report(err: WeatherError, language: Language) -> anyhow::Error {
    anyhow::anyhow!(render::error_report(&err, language))
}

/// One round of session input.
#[derive(Debug)]
struct SessionRequest {
    query: LocationQuery,
    /// Replaces the interactively supplied key when set.
    api_key: Option<String>,
}

/// Source of session rounds. `None` ends the session.
trait SessionInput {
    fn next_request(&mut self, previous: &LocationQuery) -> anyhow::Result<Option<SessionRequest>>;
}

/// Reads session rounds from inquire prompts, prefilled with the previous
/// round's answers.
struct PromptInput;

/// Esc and Ctrl-C end the session instead of failing it.
fn answered<T>(result: Result<T, InquireError>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl SessionInput for PromptInput {
    fn next_request(&mut self, previous: &LocationQuery) -> anyhow::Result<Option<SessionRequest>> {
        let city = Text::new("City:")
            .with_default(&previous.city)
            .with_validator(required!("City name must not be empty"))
            .prompt();
        let Some(city) = answered(city)? else {
            return Ok(None);
        };

        let units = Select::new("Units:", Units::all().to_vec())
            .with_starting_cursor(cursor(Units::all(), &previous.units))
            .prompt();
        let Some(units) = answered(units)? else {
            return Ok(None);
        };

        let language = Select::new("Language:", Language::all().to_vec())
            .with_starting_cursor(cursor(Language::all(), &previous.language))
            .prompt();
        let Some(language) = answered(language)? else {
            return Ok(None);
        };

        let change_key = Confirm::new("Change API key?").with_default(false).prompt();
        let Some(change_key) = answered(change_key)? else {
            return Ok(None);
        };
        let api_key = if change_key {
            Some(prompt_api_key()?)
        } else {
            None
        };

        Ok(Some(SessionRequest {
            query: location_query(&city, units, language)?,
            api_key,
        }))
    }
}

async fn session(args: QueryArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let query = query_from(&args, &config)?;
    let mut service = WeatherService::from_config(&config, explicit_key(&args)?)?;

    run_session(&mut service, &mut PromptInput, query).await
}

/// Renders one page per round against the same service, so repeated
/// requests within the TTL are answered from its cache. Pipeline errors,
/// including a missing key, are reported and the session continues.
async fn run_session(
    service: &mut WeatherService,
    input: &mut impl SessionInput,
    mut query: LocationQuery,
) -> anyhow::Result<()> {
    while let Some(request) = input.next_request(&query)? {
        if let Some(api_key) = request.api_key {
            service.credentials_mut().set_explicit(Some(api_key));
        }
        query = request.query;
        tracing::debug!(?query, "rendering session round");

        match render_page(service, &query, Sections::ALL).await {
            Ok(page) => {
                page.print();
            }
            Err(err) => eprintln!("{}\n", render::error_report(&err, query.language)),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use forecast_core::{
        CacheTtl, City, Credential, CredentialResolver, CurrentWeather, Forecast, ForecastEntry,
        ManualClock, WeatherProvider,
    };
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Provider stub that counts calls and records the keys it was given.
    #[derive(Debug, Default)]
    struct CountingProvider {
        current_calls: AtomicUsize,
        forecast_calls: AtomicUsize,
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WeatherProvider for CountingProvider {
        async fn fetch_current(
            &self,
            query: &LocationQuery,
            credential: &Credential,
        ) -> Result<CurrentWeather, WeatherError> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            let key = credential.expose().to_string();
            self.keys.lock().unwrap().push(key);
            Ok(CurrentWeather {
                location_name: query.city.clone(),
                temperature: 18.5,
                feels_like: 17.0,
                humidity: 60,
                wind_speed: 4.0,
                condition_icon: "01d".into(),
                condition_text: "clear sky".into(),
                observed_at: DateTime::<Utc>::UNIX_EPOCH,
            })
        }

        async fn fetch_forecast(
            &self,
            query: &LocationQuery,
            credential: &Credential,
        ) -> Result<Forecast, WeatherError> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            let key = credential.expose().to_string();
            self.keys.lock().unwrap().push(key);
            let entries = (0..8)
                .map(|i| ForecastEntry {
                    timestamp: DateTime::<Utc>::UNIX_EPOCH + Duration::hours(3 * i),
                    temperature: i as f64,
                    feels_like: i as f64,
                    humidity: 50,
                    wind_speed: 1.0,
                    description: "few clouds".into(),
                })
                .collect();
            Ok(Forecast {
                city: City {
                    name: query.city.clone(),
                    country: "FR".into(),
                },
                entries,
            })
        }
    }

    /// Replays a fixed list of rounds, then ends the session.
    struct Scripted(VecDeque<SessionRequest>);

    impl SessionInput for Scripted {
        fn next_request(
            &mut self,
            _previous: &LocationQuery,
        ) -> anyhow::Result<Option<SessionRequest>> {
            Ok(self.0.pop_front())
        }
    }

    fn round(city: &str, api_key: Option<&str>) -> SessionRequest {
        SessionRequest {
            query: location_query(city, Units::Metric, Language::En).unwrap(),
            api_key: api_key.map(str::to_string),
        }
    }

    fn service(provider: Arc<CountingProvider>, key: Option<&str>) -> WeatherService {
        let credentials = CredentialResolver::new(
            key.map(str::to_string),
            "FORECAST_CLI_TEST_UNSET_KEY_VAR",
            None,
        );
        WeatherService::new(
            provider,
            credentials,
            Arc::new(ManualClock::default()),
            CacheTtl::default(),
        )
    }

    fn start() -> LocationQuery {
        location_query("Almaty", Units::Metric, Language::En).unwrap()
    }

    #[tokio::test]
    async fn repeated_rounds_are_served_from_the_session_cache() {
        let provider = Arc::new(CountingProvider::default());
        let mut service = service(provider.clone(), Some("KEY"));
        let mut input = Scripted(VecDeque::from([
            round("Paris", None),
            round("paris", None),
            round("Paris", None),
        ]));

        run_session(&mut service, &mut input, start())
            .await
            .unwrap();

        assert_eq!(provider.current_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.forecast_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_city_in_a_round_fetches_again() {
        let provider = Arc::new(CountingProvider::default());
        let mut service = service(provider.clone(), Some("KEY"));
        let mut input = Scripted(VecDeque::from([
            round("Paris", None),
            round("Berlin", None),
        ]));

        run_session(&mut service, &mut input, start())
            .await
            .unwrap();

        assert_eq!(provider.current_calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.forecast_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn key_edited_in_a_round_is_used_for_later_fetches() {
        let provider = Arc::new(CountingProvider::default());
        let mut service = service(provider.clone(), None);
        let mut input = Scripted(VecDeque::from([
            round("Paris", None),
            round("Paris", Some("EDITED")),
        ]));

        run_session(&mut service, &mut input, start())
            .await
            .unwrap();

        assert_eq!(*provider.keys.lock().unwrap(), vec!["EDITED", "EDITED"]);
    }

    #[tokio::test]
    async fn one_key_resolution_covers_every_section() {
        let provider = Arc::new(CountingProvider::default());
        let service = service(provider.clone(), Some("KEY"));

        let page = render_page(&service, &start(), Sections::ALL)
            .await
            .unwrap();

        assert!(page.errors.is_empty());
        assert!(page.body.contains("Almaty"));
        assert_eq!(*provider.keys.lock().unwrap(), vec!["KEY", "KEY"]);
    }

    #[test]
    fn blank_city_is_rejected_before_any_request() {
        let err = location_query("   ", Units::Metric, Language::En).unwrap_err();
        assert!(err.to_string().contains("City name must not be empty"));
    }

    #[test]
    fn city_is_trimmed() {
        let query = location_query("  Paris ", Units::Imperial, Language::Ru).unwrap();
        assert_eq!(query.city, "Paris");
        assert_eq!(query.units, Units::Imperial);
    }
}
