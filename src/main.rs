use std::fs::read_to_string;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

mod config;
mod health;
mod pipeline;
mod registry;
mod report;
mod sensors;
mod tabular;

use config::Settings;
use pipeline::{FailurePolicy, RunOutcome};
use registry::{Registry, SensorRecord, SiteId};
use sensors::{DateRange, Fetcher};

#[derive(Parser, Debug)]
#[command(name = "hidro-status", version, about = "Health summary for a network of hydrometric sensors")]
struct Cli {
    /// Settings file; `hidro-status.toml` is read when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query every sensor of the group and write the CSV and text report
    Report {
        #[command(flatten)]
        run: RunArgs,

        /// Prefix for every output file
        #[arg(short, long)]
        output: Option<String>,

        /// Also write the rescaled series of each sensor as CSV
        #[arg(long)]
        export_series: bool,
    },
    /// Query every sensor of the group and print the summary table
    Summary {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Query one sensor, by registry name or site id, and print its summary as JSON
    Fetch {
        sensor: String,

        #[arg(short, long)]
        registry: Option<PathBuf>,

        #[command(flatten)]
        window: WindowArgs,

        /// Parse a saved API response instead of querying
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// First day queried (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day queried (YYYY-MM-DD), tomorrow by default
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Comma separated variables to request
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Sensor registry, CSV or JSON
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Only sensors of this group
    #[arg(short, long, conflicts_with = "all")]
    group: Option<String>,

    /// Every sensor regardless of group
    #[arg(long)]
    all: bool,

    /// Stop at the first sensor that cannot be fetched
    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    window: WindowArgs,
}

impl WindowArgs {
    fn range(&self, settings: &Settings, now: NaiveDateTime) -> DateRange {
        DateRange::resolve(self.start, self.end, settings.api.window_days, now.date())
    }

    fn variables(&self, settings: &Settings) -> Vec<String> {
        if self.variables.is_empty() {
            settings.api.variables.clone()
        } else {
            self.variables.clone()
        }
    }
}

fn load_registry(settings: &Settings, args: &RunArgs) -> Result<Registry> {
    let path = args.registry.clone().unwrap_or_else(|| settings.registry.path.clone());
    let group = if args.all {
        None
    } else {
        args.group.clone().or_else(|| settings.registry.group.clone())
    };
    let registry = registry::load(&path, group.as_deref())
        .with_context(|| format!("failed to load sensor registry '{}'", path.display()))?;
    if registry.is_empty() {
        log::warn!("no sensors selected from {}", path.display());
    }
    Ok(registry)
}

fn run_network(settings: &Settings, args: &RunArgs, now: NaiveDateTime) -> Result<RunOutcome> {
    settings.api.require_user()?;
    let registry = load_registry(settings, args)?;
    let fetcher = Fetcher::new(&settings.api)?;
    let range = args.window.range(settings, now);
    let variables = args.window.variables(settings);
    let policy = if args.strict {
        FailurePolicy::Abort
    } else {
        FailurePolicy::Skip
    };

    log::info!("querying {} sensors from {} to {}", registry.len(), range.start, range.end);
    let outcome = pipeline::run(&registry, &settings.health, now, policy, |record| {
        fetcher.fetch(record, &range, &variables)
    })?;
    log::info!("summarized {} of {} sensors", outcome.table.len(), registry.len());
    Ok(outcome)
}

fn check_outcome(outcome: &RunOutcome) -> Result<()> {
    if outcome.is_total_failure() {
        bail!("none of the {} sensors returned data", outcome.skipped.len());
    }
    Ok(())
}

/// Registry entry matching `sensor` by name or site id, or a bare record when there is none.
fn resolve_sensor(settings: &Settings, registry_path: Option<PathBuf>, sensor: &str) -> SensorRecord {
    let path = registry_path.unwrap_or_else(|| settings.registry.path.clone());
    let site_id = SiteId::new(sensor);
    match registry::load(&path, None) {
        Ok(registry) => {
            let found = registry
                .get(sensor)
                .or_else(|| registry.iter().find(|record| record.site_id == site_id));
            if let Some(record) = found {
                return record.clone();
            }
            log::warn!("'{sensor}' is not in {}; treating it as a site id", path.display());
        }
        // @NOTE: the registry is only used for the name here, a bare site id still works
        Err(err) => log::debug!("registry unavailable: {err}"),
    }
    SensorRecord {
        name: sensor.to_string(),
        site_id,
        site: Default::default(),
    }
}

fn entry(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let now = Local::now().naive_local();

    match cli.command {
        Command::Report {
            run,
            output,
            export_series,
        } => {
            if let Some(output) = output {
                settings.report.output = output;
            }
            let outcome = run_network(&settings, &run, now)?;
            report::write_outputs(&outcome, &settings.report, &settings.health, now, export_series)
                .context("failed to write report")?;
            check_outcome(&outcome)
        }

        Command::Summary { run } => {
            let outcome = run_network(&settings, &run, now)?;
            check_outcome(&outcome)?;
            if outcome.table.is_empty() {
                log::warn!("no sensors to show");
            }
            print!("{}", report::render_table(&outcome.table));
            Ok(())
        }

        Command::Fetch {
            sensor,
            registry,
            window,
            from_file,
        } => {
            let record = resolve_sensor(&settings, registry, &sensor);
            let series = match from_file {
                Some(path) => {
                    let body = read_to_string(&path)
                        .with_context(|| format!("failed to read '{}'", path.display()))?;
                    let series = sensors::parse_series(&body)?;
                    series.log_invalid_cells(&record);
                    series
                }
                None => {
                    settings.api.require_user()?;
                    let fetcher = Fetcher::new(&settings.api)?;
                    fetcher.fetch(&record, &window.range(&settings, now), &window.variables(&settings))?
                }
            };
            log::info!(
                "{} readings from {} to {}",
                series.len(),
                series.first().timestamp,
                series.last().timestamp
            );
            let summary = health::summarize(&record, &series, &settings.health, now);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match entry(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
