//! RPS CLI binary.
//!
//! Provides command-line interface for the RPS factor and signal engine.

mod database;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rps::{EngineConfig, LogFormat, Pipeline, init_logging};
use rps_data::{AssetClass, FactorStore, SignalStore, SqliteStore};
use rps_factors::{RunMode, available_calculators};
use rps_output::{ExportFormat, Exporter, TopRankedQuery, top_ranked};
use rps_signals::Strategy;
use std::path::{Path, PathBuf};
use std::process;
use tracing::error;

#[derive(Parser)]
#[command(name = "rps")]
#[command(about = "RPS: relative price strength factor and signal engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configuration file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log filter, overrides the configuration file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: pretty, compact or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute change and percentile rank factors
    Factor {
        /// Run mode: init (replace everything) or daily (rewrite recent dates)
        #[arg(long, default_value = "daily")]
        mode: RunMode,

        /// Calculators to run (stock, sector, etf); all when omitted
        #[arg(long, value_delimiter = ',')]
        calculators: Vec<String>,

        /// Lookback periods, overrides the configuration file
        #[arg(long, value_delimiter = ',')]
        periods: Vec<usize>,

        /// Last date to load (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Rebuild the eligible-entity pool from ownership data
    Pool {
        /// Date stamped on the members (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Run a strategy and store its signals
    Signals {
        /// Strategy name (see `rps strategies`)
        #[arg(long)]
        strategy: Strategy,

        /// Target date (default: latest stock price date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List available strategies and calculators
    Strategies,

    /// Show the top ranked entities on the latest factor date
    Top {
        /// Asset class
        #[arg(long, default_value = "sector")]
        class: AssetClass,

        /// Period whose rank is compared
        #[arg(long, default_value = "20")]
        period: usize,

        /// Ranks strictly above this value are listed
        #[arg(long, default_value = "95")]
        threshold: f64,

        /// Maximum number of entries
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Output format: text, csv, json or pretty
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Export stored signals or factor rows
    Export {
        /// What to export
        #[arg(value_enum)]
        kind: ExportKind,

        /// Date to export
        #[arg(long)]
        date: NaiveDate,

        /// Strategy filter for signals
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Asset class for factors
        #[arg(long, default_value = "stock")]
        class: AssetClass,

        /// Output format: csv, json or pretty
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Daily factor run, pool refresh and every strategy
    Pipeline {
        /// Last date to load (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Show database location and row counts
    Status,

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    /// Signals of one date
    Signals,
    /// Factor rows of one date
    Factors,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn load_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    Ok(config)
}

/// Run the command. `Ok(false)` means it completed with failures.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_logging(&config.log).map_err(|e| e.to_string())?;

    let db_path = database::resolve_path(cli.db.as_deref(), config.database.as_deref());

    match cli.command {
        Commands::Strategies => {
            list_strategies();
            Ok(true)
        }
        Commands::Config => {
            config.database = Some(db_path);
            print!("{}", config.to_toml_string()?);
            Ok(true)
        }
        Commands::Factor {
            mode,
            calculators,
            periods,
            as_of,
        } => {
            if !periods.is_empty() {
                config.factor.periods = periods;
                config.validate()?;
            }
            let store = database::open_store(&db_path)?;
            run_factor(&store, &config, mode, &calculators, as_of.unwrap_or_else(today))
        }
        Commands::Pool { as_of } => {
            let store = database::open_store(&db_path)?;
            let outcome = Pipeline::new(&store, &config).run_pool_refresh(as_of.unwrap_or_else(today))?;
            print!("{}", outcome);
            Ok(true)
        }
        Commands::Signals { strategy, date } => {
            let store = database::open_store(&db_path)?;
            run_signals(&store, &config, strategy, date)?;
            Ok(true)
        }
        Commands::Top {
            class,
            period,
            threshold,
            limit,
            format,
        } => {
            let store = database::open_store(&db_path)?;
            let query = TopRankedQuery {
                class,
                period,
                threshold,
                limit,
            };
            show_top(&store, &query, &format)?;
            Ok(true)
        }
        Commands::Export {
            kind,
            date,
            strategy,
            class,
            format,
            output,
        } => {
            let store = database::open_store(&db_path)?;
            export(&store, &config, kind, date, strategy, class, format, output.as_deref())?;
            Ok(true)
        }
        Commands::Pipeline { as_of } => {
            let store = database::open_store(&db_path)?;
            let report = Pipeline::new(&store, &config).run_pipeline(as_of.unwrap_or_else(today))?;
            print!("{}", report);
            Ok(true)
        }
        Commands::Status => {
            let store = database::open_store(&db_path)?;
            show_status(&store, &db_path)?;
            Ok(true)
        }
    }
}

fn run_factor(
    store: &SqliteStore,
    config: &EngineConfig,
    mode: RunMode,
    calculators: &[String],
    as_of: NaiveDate,
) -> Result<bool, Box<dyn std::error::Error>> {
    let total = if calculators.is_empty() {
        available_calculators().len()
    } else {
        calculators.len()
    };

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.set_message(format!("Running {} factors...", mode));

    let report = Pipeline::new(store, config).run_factor_with(mode, calculators, as_of, |r| {
        pb.set_message(r.calculator.to_string());
        pb.inc(1);
    });
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };

    if report.is_success() {
        pb.finish_with_message(format!("{} rows written", report.rows_written()));
    } else {
        pb.finish_with_message(format!("failed: {}", report.failed().join(", ")));
    }
    print!("{}", report);
    Ok(report.is_success())
}

fn run_signals(
    store: &SqliteStore,
    config: &EngineConfig,
    strategy: Strategy,
    date: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = Pipeline::new(store, config).run_signals(strategy, date)?;

    println!("Strategy:   {}", outcome.strategy);
    println!("Date:       {}", outcome.date);
    println!("Candidates: {}", outcome.candidates);
    println!(
        "Evaluated:  {} (skipped {}, failed {})",
        outcome.evaluated, outcome.skipped, outcome.failed
    );
    println!("Signals:    {}", outcome.signals.len());
    for signal in &outcome.signals {
        let reason = signal.meta["reason"].as_str().unwrap_or_default();
        println!(
            "  {:<10} {:<4} {}",
            signal.entity_id,
            signal.signal_type.to_db_str(),
            reason
        );
    }
    Ok(())
}

fn list_strategies() {
    println!("Strategies:");
    for info in Strategy::all() {
        println!("  {:<18} {}", info.name, info.description);
    }
    println!("\nCalculators:");
    for info in available_calculators() {
        println!("  {:<18} {}", info.name, info.description);
    }
}

fn show_top(
    store: &SqliteStore,
    query: &TopRankedQuery,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = top_ranked(store, query)?;
    if format.eq_ignore_ascii_case("text") {
        print!("{}", report);
    } else {
        let format: ExportFormat = format.parse()?;
        println!("{}", report.entries.export_to_string(format)?);
    }
    Ok(())
}

fn emit<E: Exporter>(
    data: &E,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            data.export_to_file(path, format)?;
            println!("Exported to {}", path.display());
        }
        None => println!("{}", data.export_to_string(format)?),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn export(
    store: &SqliteStore,
    config: &EngineConfig,
    kind: ExportKind,
    date: NaiveDate,
    strategy: Option<Strategy>,
    class: AssetClass,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    match kind {
        ExportKind::Signals => {
            let signals = store.signals(strategy.as_ref().map(Strategy::name), date)?;
            emit(&signals, format, output)
        }
        ExportKind::Factors => {
            let rows = store.factor_snapshot(class, date, &config.factor.sorted_periods())?;
            emit(&rows, format, output)
        }
    }
}

fn show_status(store: &SqliteStore, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let stats = store.get_stats()?;

    println!("Database: {}", path.display());
    println!("\n{:<8} {:>12} {:>12} {:>12}", "class", "prices", "factors", "latest");
    for ((class, prices), (_, factors)) in stats.price_rows.iter().zip(&stats.factor_rows) {
        let latest = store
            .latest_factor_date(*class)?
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        println!("{:<8} {:>12} {:>12} {:>12}", class, prices, factors, latest);
    }
    println!("\nPool rows:   {}", stats.pool_rows);
    println!("Signal rows: {}", stats.signal_rows);
    Ok(())
}
