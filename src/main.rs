use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod filter;
mod forecast;
mod growth;
mod leaderboard;
mod loader;
mod models;
mod pages;
mod report;
mod trend;

use crate::error::DashboardError;
use crate::forecast::SeasonalTrendForecaster;
use crate::loader::Dataset;
use crate::pages::Selection;

#[derive(Parser)]
#[command(name = "eoi-dashboard")]
#[command(about = "SkillSelect EOI volume leaderboards, trends and forecasts", long_about = None)]
struct Cli {
    /// Directory holding df_master.parquet, df_master.zip, df_master.csv.gz or data/df_master.csv
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Where to load the EOI table from
    #[arg(long, value_enum, global = true, default_value_t = Source::Files)]
    source: Source,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Files,
    Db,
}

#[derive(Args)]
struct PeriodFilters {
    #[arg(long = "visa")]
    visa: Vec<String>,
    #[arg(long = "status")]
    status: Vec<String>,
    /// Submission month as YYYY-MM
    #[arg(long = "period")]
    period: Vec<String>,
}

#[derive(Args)]
struct ForecastOptions {
    #[arg(long, default_value_t = forecast::DEFAULT_INTERVAL_WIDTH)]
    interval_width: f64,
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres schema
    InitDb,
    /// Import EOI rows from a CSV file into Postgres
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Headline numbers and the global EOI trend
    Overview,
    /// List every occupation in the table
    Occupations,
    /// Top 15 occupations by demand with points analytics
    Leaderboard {
        #[command(flatten)]
        filters: PeriodFilters,
    },
    /// Per-visa monthly breakdown for one occupation
    Breakdown {
        #[arg(long)]
        occupation: String,
        #[arg(long = "visa")]
        visa: Vec<String>,
        #[arg(long = "status")]
        status: Vec<String>,
        #[arg(long = "points")]
        points: Vec<String>,
    },
    /// Fastest growing occupations over the last three months
    Growth {
        #[command(flatten)]
        filters: PeriodFilters,
    },
    /// Six-month projection for one occupation
    Forecast {
        #[arg(long)]
        occupation: String,
        /// Include fitted values for the observed months
        #[arg(long)]
        with_history: bool,
        #[command(flatten)]
        options: ForecastOptions,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        forecast_occupation: Option<String>,
        #[command(flatten)]
        options: ForecastOptions,
    },
}

fn selection(values: Vec<String>) -> Option<BTreeSet<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.into_iter().collect())
    }
}

impl From<PeriodFilters> for Selection {
    fn from(filters: PeriodFilters) -> Self {
        Selection {
            visa_types: selection(filters.visa),
            statuses: selection(filters.status),
            third: selection(filters.period),
        }
    }
}

fn data_dir(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value
        .or_else(|| std::env::var_os("EOI_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to use the Postgres copy of the EOI table")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_dataset(source: Source, data_dir: PathBuf) -> anyhow::Result<Dataset> {
    match source {
        Source::Files => {
            tokio::task::spawn_blocking(move || loader::load_from_dir(&data_dir)).await?
        }
        Source::Db => {
            let pool = connect().await?;
            let records = db::fetch_records(&pool).await?;
            tracing::info!(rows = records.len(), "loaded EOI table from Postgres");
            Ok(Dataset::new(records))
        }
    }
}

/// Prints a page outcome. Expected conditions are shown as messages, never
/// as a failed exit.
fn emit<T: Serialize>(
    json: bool,
    outcome: Result<T, DashboardError>,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match outcome {
        Ok(value) if json => println!("{}", serde_json::to_string_pretty(&value)?),
        Ok(value) => render(&value),
        Err(err) if json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "error": err.to_string() }))?
        ),
        Err(err) => println!("{err}"),
    }
    Ok(())
}

async fn run_forecast(
    dataset: &Dataset,
    occupation: &str,
    with_history: bool,
    options: &ForecastOptions,
) -> Result<models::ForecastResult, DashboardError> {
    if dataset.is_empty() {
        return Err(DashboardError::NoDataLoaded);
    }
    forecast::run_with_timeout(
        SeasonalTrendForecaster::with_interval_width(options.interval_width),
        occupation.to_string(),
        forecast::training_series(dataset, occupation),
        with_history,
        Duration::from_secs(options.timeout_secs),
    )
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match &cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, csv).await?;
            println!("Inserted {inserted} EOI rows from {}.", csv.display());
            return Ok(());
        }
        _ => {}
    }

    let dataset = load_dataset(cli.source, data_dir(cli.data_dir)).await?;

    match cli.command {
        Commands::InitDb | Commands::Import { .. } => {}
        Commands::Overview => {
            emit(json, pages::overview(&dataset), |overview| {
                println!("Occupations tracked: {}", overview.occupations_tracked);
                println!("Total historical EOIs: {}", overview.total_eois);
                if let (Some(first), Some(last)) = (overview.first_period, overview.last_period) {
                    println!("Data range: {} - {}", first.format("%b %y"), last.format("%b %y"));
                }
                println!("Global EOI trend:");
                for point in &overview.trend {
                    println!("- {}: {:.0}", point.timestamp.format("%Y-%m"), point.value);
                }
            })?;
        }
        Commands::Occupations => {
            let outcome = if dataset.is_empty() {
                Err(DashboardError::NoDataLoaded)
            } else {
                Ok(dataset.occupations())
            };
            emit(json, outcome, |occupations| {
                for occupation in occupations {
                    println!("{occupation}");
                }
            })?;
        }
        Commands::Leaderboard { filters } => {
            emit(json, pages::leaderboard(&dataset, filters.into()), |rows| {
                println!("Top occupations by demand:");
                for (rank, row) in rows.iter().enumerate() {
                    println!(
                        "{:>2}. {} - {} EOIs (dominant {}, range {}-{})",
                        rank + 1,
                        row.occupation,
                        row.total_demand,
                        row.dominant_point,
                        row.lowest_point,
                        row.highest_point
                    );
                }
            })?;
        }
        Commands::Breakdown {
            occupation,
            visa,
            status,
            points,
        } => {
            let selection = Selection {
                visa_types: selection(visa),
                statuses: selection(status),
                third: selection(points),
            };
            emit(json, pages::breakdown(&dataset, &occupation, selection), |breakdown| {
                println!("EOI composition for {}:", breakdown.occupation);
                for point in &breakdown.series {
                    println!(
                        "- {} {}: {}",
                        point.timestamp.format("%Y-%m"),
                        point.visa_type,
                        point.value
                    );
                }
                println!("Total filtered (latest): {:.0}", breakdown.latest_total);
            })?;
        }
        Commands::Growth { filters } => {
            emit(json, pages::growth(&dataset, filters.into()), |rows| {
                if rows.is_empty() {
                    println!("No occupation had volume in the earlier window.");
                    return;
                }
                println!("Fastest growing occupations:");
                for row in rows {
                    println!(
                        "- {}: {:+.1}% ({:.1} -> {:.1} per month)",
                        row.occupation, row.growth_pct, row.prev3_avg, row.last3_avg
                    );
                }
            })?;
        }
        Commands::Forecast {
            occupation,
            with_history,
            options,
        } => {
            let outcome = run_forecast(&dataset, &occupation, with_history, &options).await;
            emit(json, outcome, |result| {
                if let Some(fitted) = &result.fitted {
                    println!("Fitted history for {}:", result.occupation);
                    for (row, actual) in fitted.iter().zip(&result.history) {
                        println!(
                            "- {}: actual {:.0}, fitted {:.1} [{:.1}, {:.1}]",
                            row.timestamp.format("%Y-%m"),
                            actual.value,
                            row.point_estimate,
                            row.lower_bound,
                            row.upper_bound
                        );
                    }
                }
                println!("Forecast for {}:", result.occupation);
                for row in &result.future {
                    println!(
                        "- {}: {:.1} [{:.1}, {:.1}]",
                        row.timestamp.format("%B %Y"),
                        row.point_estimate,
                        row.lower_bound,
                        row.upper_bound
                    );
                }
            })?;
        }
        Commands::Report {
            out,
            forecast_occupation,
            options,
        } => {
            let overview = pages::overview(&dataset);
            let leaderboard = pages::leaderboard(&dataset, Selection::default());
            let growth = pages::growth(&dataset, Selection::default());
            let forecast = match forecast_occupation.as_deref() {
                Some(occupation) => {
                    Some(run_forecast(&dataset, occupation, false, &options).await)
                }
                None => None,
            };

            let report = report::build_report(&report::ReportInputs {
                overview: &overview,
                leaderboard: &leaderboard,
                growth: &growth,
                forecast: forecast.as_ref(),
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
