/*!
 * Run many independent scenarios at once against one shared ledger.
 *
 * Scenarios are fed to a pool of worker threads over a bounded channel. Every worker runs its own
 * Pipeline, the ledger is the only thing they share.
 */

use crate::{
    config::PipelineConfig,
    error::ReliefResult,
    ledger::{Ledger, LedgerStore},
    pipeline::{Pipeline, PipelineReport},
    scenario::Scenario,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

const CHANNEL_SIZE: usize = 16;

/// The outcome of one scenario in a batch.
#[derive(Debug)]
pub struct BatchResult {
    pub scenario_id: String,
    pub result: ReliefResult<PipelineReport>,
}

/**
 * Run every scenario through its own pipeline.
 *
 * A scenario that fails does not stop the others.
 *
 * #Arguments
 * jobs - the scenarios, each an independent area.
 * config - shared by every pipeline.
 * ledger - the shared inventory.
 * workers - the number of worker threads, defaults to the number of CPUs.
 *
 * #Returns
 * One result per scenario, in the same order as `jobs`.
 */
pub fn run_batch<S>(
    jobs: Vec<Scenario>,
    config: Arc<PipelineConfig>,
    ledger: Arc<Ledger<S>>,
    workers: Option<usize>,
) -> ReliefResult<Vec<BatchResult>>
where
    S: LedgerStore + 'static,
{
    let num_jobs = jobs.len();
    let workers = workers.unwrap_or_else(num_cpus::get).clamp(1, num_jobs.max(1));

    log::info!("running {} scenarios on {} workers", num_jobs, workers);

    let (to_workers, from_feeder) = bounded::<(usize, Scenario)>(CHANNEL_SIZE);
    let (to_collector, from_workers) = bounded::<(usize, BatchResult)>(CHANNEL_SIZE);

    let mut handles = Vec::with_capacity(workers);
    for i in 0..workers {
        handles.push(start_worker_thread(
            i,
            from_feeder.clone(),
            to_collector.clone(),
            Arc::clone(&config),
            Arc::clone(&ledger),
        )?);
    }

    // Only the workers hold these now, so the channels close when the work is done.
    drop(from_feeder);
    drop(to_collector);

    let feeder = start_feeder_thread(jobs, to_workers)?;

    let mut results: Vec<(usize, BatchResult)> = Vec::with_capacity(num_jobs);
    for res in from_workers {
        results.push(res);
    }

    if feeder.join().is_err() {
        log::error!("scenario feeder thread panicked");
    }

    for jh in handles {
        if jh.join().is_err() {
            log::error!("pipeline worker thread panicked");
        }
    }

    results.sort_by_key(|(i, _)| *i);
    Ok(results.into_iter().map(|(_, res)| res).collect())
}

fn start_feeder_thread(
    jobs: Vec<Scenario>,
    to_workers: Sender<(usize, Scenario)>,
) -> ReliefResult<JoinHandle<()>> {
    let jh = thread::Builder::new()
        .name("reliefplan-feeder".to_owned())
        .spawn(move || {
            for job in jobs.into_iter().enumerate() {
                if to_workers.send(job).is_err() {
                    log::error!("every pipeline worker has exited");
                    break;
                }
            }
        })?;

    Ok(jh)
}

fn start_worker_thread<S>(
    worker: usize,
    from_feeder: Receiver<(usize, Scenario)>,
    to_collector: Sender<(usize, BatchResult)>,
    config: Arc<PipelineConfig>,
    ledger: Arc<Ledger<S>>,
) -> ReliefResult<JoinHandle<()>>
where
    S: LedgerStore + 'static,
{
    let jh = thread::Builder::new()
        .name(format!("reliefplan-worker-{}", worker))
        .spawn(move || {
            for (i, scenario) in from_feeder {
                let scenario_id = scenario.id.clone();

                let mut pipeline = Pipeline::new(scenario_id.clone(), &config, &ledger);
                let result = pipeline.run(scenario);

                if let Err(ref err) = result {
                    log::warn!("scenario {} failed: {}", scenario_id, err);
                }

                if to_collector
                    .send((
                        i,
                        BatchResult {
                            scenario_id,
                            result,
                        },
                    ))
                    .is_err()
                {
                    break;
                }
            }
        })?;

    Ok(jh)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        assessment::{Assessment, DamageType},
        geo::GeoPoint,
        ledger::{LedgerKey, MemoryStore},
        resource::{Resource, ResourceKind},
    };
    use chrono::{TimeZone, Utc};

    fn scenario(id: &str, lat: f64, resources: Vec<Resource>) -> Scenario {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        Scenario {
            id: id.to_owned(),
            reference_time: now,
            assessments: vec![Assessment {
                id: format!("{}-a", id),
                point: GeoPoint {
                    latitude: lat,
                    longitude: -90.0,
                },
                severity: 95,
                damage_type: DamageType::Flood,
                confidence: 1.0,
                observed_at: now,
                source: "test".to_owned(),
            }],
            resources,
            vehicles: vec![],
        }
    }

    fn depot(quantity: u32) -> Resource {
        Resource {
            kind: ResourceKind::Water,
            facility_id: "depot".to_owned(),
            location: GeoPoint {
                latitude: 30.0,
                longitude: -90.0,
            },
            quantity,
            capacity: quantity,
        }
    }

    #[test]
    fn test_results_in_job_order() {
        let ledger = Arc::new(Ledger::new(MemoryStore::new()));
        ledger.seed(&[depot(100_000)]).unwrap();

        let jobs: Vec<Scenario> = (0..12)
            .map(|i| scenario(&format!("area-{:02}", i), 30.0 + f64::from(i) * 0.1, vec![depot(0)]))
            .collect();

        let results =
            run_batch(jobs, Arc::new(PipelineConfig::default()), ledger, Some(4)).unwrap();

        let ids: Vec<String> = results.iter().map(|r| r.scenario_id.clone()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("area-{:02}", i)).collect();
        assert_eq!(ids, expected);
        assert!(results.iter().all(|r| r.result.is_ok()));
    }

    #[test]
    fn test_failure_is_isolated() {
        let ledger = Arc::new(Ledger::new(MemoryStore::new()));
        ledger.seed(&[depot(1000)]).unwrap();

        let mut bad = scenario("bad", 30.0, vec![depot(0)]);
        bad.assessments[0].severity = 200;

        let jobs = vec![
            scenario("good-1", 30.0, vec![depot(0)]),
            bad,
            scenario("good-2", 30.5, vec![depot(0)]),
        ];

        let results = run_batch(jobs, Arc::new(PipelineConfig::default()), ledger, None).unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].result.is_ok());
        assert!(results[1].result.is_err());
        assert!(results[2].result.is_ok());
    }

    #[test]
    fn test_shared_depot_not_overdrawn() {
        let ledger = Arc::new(Ledger::new(MemoryStore::new()).with_max_attempts(10_000));
        ledger.seed(&[depot(500)]).unwrap();

        let jobs: Vec<Scenario> = (0..8)
            .map(|i| scenario(&format!("area-{}", i), 30.0 + f64::from(i) * 0.05, vec![depot(0)]))
            .collect();

        let results = run_batch(
            jobs,
            Arc::new(PipelineConfig::default()),
            Arc::clone(&ledger),
            Some(8),
        )
        .unwrap();

        let drawn: u64 = results
            .iter()
            .map(|r| r.result.as_ref().unwrap())
            .flat_map(|report| report.allocations.iter())
            .map(|a| u64::from(a.quantity))
            .sum();

        let left = ledger
            .read(&LedgerKey::new("depot", ResourceKind::Water))
            .unwrap();

        assert_eq!(drawn + u64::from(left), 500);
        assert_eq!(left, 0);
    }
}
