//! Documentation for the binary is with the definition of `ReliefBatchOptionsInit` below.

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use reliefplan::{
    BatchResult, Ledger, LedgerStore, MemoryStore, PipelineConfig, Scenario, SqliteStore,
};
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Plan relief deliveries for every scenario in a directory at once.
///
/// Each scenario is an independent area with its own pipeline. All of them draw stock from the
/// same ledger.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "reliefbatch")]
#[clap(author, version, about)]
struct ReliefBatchOptionsInit {
    /// The directory to search for scenario files (*.json).
    ///
    /// If this is not specified, then the program will check for it in the "RELIEF_SCENARIO_DIR"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "RELIEF_SCENARIO_DIR")]
    scenario_dir: PathBuf,

    /// The path to a pipeline configuration file (JSON). Defaults are used if not specified.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// The path to a SQLite ledger database.
    ///
    /// If this is not specified, then the program will check for it in the "RELIEF_LEDGER_DB"
    /// environment variable. If neither is set an in memory ledger seeded from the scenarios is
    /// used.
    #[clap(short, long)]
    #[clap(env = "RELIEF_LEDGER_DB")]
    ledger_db: Option<PathBuf>,

    /// Overwrite the ledger with the stock levels in the scenarios before planning.
    #[clap(long)]
    seed: bool,

    /// Number of pipelines to run at once, defaults to the number of CPUs.
    #[clap(short, long)]
    workers: Option<usize>,

    /// Write a JSON report for each scenario into this directory.
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    let opts = ReliefBatchOptionsInit::parse();

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

    let scenarios = load_scenarios(&opts.scenario_dir);
    if scenarios.is_empty() {
        warn!(target: "summary", "No scenarios found in {}", opts.scenario_dir.display());
        return Ok(());
    }

    if let Some(ref dir) = opts.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    match opts.ledger_db {
        Some(ref path) => {
            let ledger = Ledger::new(SqliteStore::connect(path)?)
                .with_max_attempts(config.ledger_max_attempts);

            if opts.seed {
                seed_all(&ledger, &scenarios)?;
            }

            run(ledger, config, scenarios, &opts)
        }
        None => {
            let ledger =
                Ledger::new(MemoryStore::new()).with_max_attempts(config.ledger_max_attempts);
            seed_all(&ledger, &scenarios)?;

            run(ledger, config, scenarios, &opts)
        }
    }
}

/// Load every readable scenario under `dir`, skipping the ones that fail.
fn load_scenarios(dir: &Path) -> Vec<Scenario> {
    reliefplan::find_scenarios(dir)
        .into_iter()
        .filter_map(|path| match Scenario::load(&path) {
            Ok(scenario) => {
                debug!(target: "dir-walker", "Loaded: {}", path.display());
                Some(scenario)
            }
            Err(err) => {
                warn!(target: "dir-walker", "Skipping {} :: {}", path.display(), err);
                None
            }
        })
        .collect()
}

/// Several scenarios may list the same facility, the last one listed wins.
fn seed_all<S: LedgerStore>(
    ledger: &Ledger<S>,
    scenarios: &[Scenario],
) -> Result<(), Box<dyn Error>> {
    for scenario in scenarios {
        ledger.seed(&scenario.resources)?;
    }

    Ok(())
}

fn run<S: LedgerStore + 'static>(
    ledger: Ledger<S>,
    config: PipelineConfig,
    scenarios: Vec<Scenario>,
    opts: &ReliefBatchOptionsInit,
) -> Result<(), Box<dyn Error>> {
    let ledger = Arc::new(ledger);

    let results = reliefplan::run_batch(
        scenarios,
        Arc::new(config),
        Arc::clone(&ledger),
        opts.workers,
    )?;

    let mut num_failed = 0;
    for BatchResult {
        scenario_id,
        result,
    } in results
    {
        match result {
            Ok(report) => {
                info!(
                    target: "summary",
                    "{:>20} {:>5.1}% covered, {:>4} allocations, {:>3} routes",
                    scenario_id,
                    report.summary.coverage_percentage,
                    report.allocations.len(),
                    report.routes.len()
                );

                if let Some(ref dir) = opts.output_dir {
                    let path = dir.join(format!("{}.report.json", scenario_id));
                    reliefplan::write_json(&report, &path)?;
                }
            }
            Err(err) => {
                num_failed += 1;
                warn!(target: "summary", "{:>20} FAILED :: {}", scenario_id, err);
            }
        }
    }

    if opts.verbose {
        for (key, quantity) in ledger.store().entries()? {
            debug!(target: "ledger", "{:>24} {:>9}", key.to_string(), quantity);
        }
    }

    if num_failed > 0 {
        return Err(format!("{} scenarios failed", num_failed).into());
    }

    Ok(())
}
