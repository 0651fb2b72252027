//! Documentation for the binary is with the definition of `ReliefPlanOptionsInit` below.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use log::{debug, info, LevelFilter};
use reliefplan::{
    Ledger, LedgerStore, MemoryStore, Pipeline, PipelineConfig, Scenario, SqliteStore,
};
use simple_logger::SimpleLogger;
use std::{error::Error, path::PathBuf};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Plan relief deliveries for a single scenario.
///
/// Clusters the damage assessments in the scenario into impact zones, allocates facility stock to
/// them, and loads the allocations onto the fleet.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "reliefplan")]
#[clap(author, version, about)]
struct ReliefPlanOptionsInit {
    /// The path to the scenario file (JSON).
    #[clap(short, long)]
    scenario: PathBuf,

    /// The path to a pipeline configuration file (JSON). Defaults are used if not specified.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// The path to a SQLite ledger database shared with other planners.
    ///
    /// If this is not specified, then the program will check for it in the "RELIEF_LEDGER_DB"
    /// environment variable. If neither is set an in memory ledger seeded from the scenario is
    /// used.
    #[clap(short, long)]
    #[clap(env = "RELIEF_LEDGER_DB")]
    ledger_db: Option<PathBuf>,

    /// Overwrite the ledger with the stock levels in the scenario before planning.
    #[clap(long)]
    seed: bool,

    /// Override the scenario reference time (UTC) in the format YYYY-MM-DD-HH
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_datetime))]
    reference_time: Option<DateTime<Utc>>,

    /// Write the full report as JSON to this file.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// Parse a command line datetime
fn parse_datetime(dt_str: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    const TIME_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";
    let t_str = format!("{}:00:00", dt_str);

    let naive = NaiveDateTime::parse_from_str(&t_str, TIME_FORMAT)?;

    Ok(Utc.from_utc_datetime(&naive))
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    let opts = ReliefPlanOptionsInit::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // The ledger logs every update attempt at debug.
    SimpleLogger::new()
        .with_level(level)
        .with_module_level("reliefplan::ledger", LevelFilter::Info)
        .init()?;

    if opts.verbose {
        info!(target: "startup", "{:#?}", opts);
        debug!(target: "startup", "Debug logging active.");
    }

    let config = match opts.config {
        Some(ref path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let mut scenario = Scenario::load(&opts.scenario)?;
    if let Some(reference_time) = opts.reference_time {
        scenario.reference_time = reference_time;
    }

    match opts.ledger_db {
        Some(ref path) => {
            let ledger = Ledger::new(SqliteStore::connect(path)?)
                .with_max_attempts(config.ledger_max_attempts);

            if opts.seed {
                ledger.seed(&scenario.resources)?;
            }

            plan(&ledger, &config, scenario, &opts)
        }
        None => {
            let ledger =
                Ledger::new(MemoryStore::new()).with_max_attempts(config.ledger_max_attempts);
            ledger.seed(&scenario.resources)?;

            plan(&ledger, &config, scenario, &opts)
        }
    }
}

fn plan<S: LedgerStore>(
    ledger: &Ledger<S>,
    config: &PipelineConfig,
    scenario: Scenario,
    opts: &ReliefPlanOptionsInit,
) -> Result<(), Box<dyn Error>> {
    let mut pipeline = Pipeline::new(scenario.id.clone(), config, ledger);
    let report = pipeline.run(scenario)?;

    println!("{}", report);

    for route in &report.routes {
        println!(
            "{:>12} {:<10} {:>3} stops {:>9.1} kg {:>7.1} km {:>5.1} h",
            route.vehicle_id,
            route.vehicle_kind.name(),
            route.allocation_ids.len(),
            route.total_load_kg,
            route.total_distance_km,
            route.duration_hours
        );
    }

    if opts.verbose {
        for (key, quantity) in ledger.store().entries()? {
            debug!(target: "ledger", "{:>24} {:>9}", key.to_string(), quantity);
        }
    }

    if let Some(ref path) = opts.output {
        reliefplan::write_json(&report, path)?;
        info!(target: "summary", "Report written to {}", path.display());
    }

    Ok(())
}
