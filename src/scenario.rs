/*!
 * Scenario documents, everything needed for one planning run.
 *
 * A scenario is a JSON file holding a batch of assessments for one area and snapshots of the
 * facility stocks and vehicle fleet that can serve it.
 */

use crate::{
    assessment::{self, Assessment},
    error::{ReliefError, ReliefResult},
    ledger::LedgerKey,
    packer::Vehicle,
    resource::Resource,
};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// The input to one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    /// "Now" for the run. Recency and the time window are measured from here.
    pub reference_time: DateTime<Utc>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

impl Scenario {
    /// Read and validate a scenario file.
    pub fn load<P: AsRef<Path>>(path: P) -> ReliefResult<Self> {
        let rdr = BufReader::new(File::open(path.as_ref())?);
        let scenario: Scenario = serde_json::from_reader(rdr)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check everything that came from outside before any of it is used.
    pub fn validate(&self) -> ReliefResult<()> {
        if self.id.is_empty() {
            return Err(ReliefError::invalid("scenario with an empty id"));
        }

        assessment::validate_all(&self.assessments)?;
        self.resources.iter().try_for_each(Resource::validate)?;

        // One stock entry per facility and kind, the ledger keys on that pair.
        let mut seen: HashSet<LedgerKey> = HashSet::default();
        for res in &self.resources {
            let key = LedgerKey::from(res);
            if seen.contains(&key) {
                return Err(ReliefError::invalid(format!("duplicate stock entry for {}", key)));
            }
            seen.insert(key);
        }

        self.vehicles.iter().try_for_each(Vehicle::validate)
    }
}

/// Find every scenario file, `*.json`, under a directory.
///
/// The paths are sorted so a batch is always submitted in the same order.
pub fn find_scenarios<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|res| res.ok())
        // Ignore directories, WalkDir will take care of recursing into them.
        .filter(|entry| entry.path().is_file())
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "json"))
        .map(|entry| entry.into_path())
        .collect();

    paths.sort();
    paths
}

/// Write any serializable report as pretty printed JSON.
pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> ReliefResult<()> {
    let mut wtr = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut wtr, value)?;
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const SCENARIO: &str = r#"{
        "id": "gulf-coast",
        "reference_time": "2024-06-01T12:00:00Z",
        "assessments": [
            {
                "id": "a-1",
                "point": {"latitude": 29.76, "longitude": -95.37},
                "severity": 80,
                "damage_type": "flood",
                "confidence": 0.9,
                "observed_at": "2024-06-01T10:00:00Z",
                "source": "sat-7"
            }
        ],
        "resources": [
            {
                "type": "water",
                "facility_id": "wh-1",
                "location": {"latitude": 29.70, "longitude": -95.30},
                "quantity": 500,
                "capacity": 1000
            }
        ],
        "vehicles": [
            {
                "id": "truck-1",
                "type": "truck",
                "capacity_kg": 5000,
                "location": {"latitude": 29.70, "longitude": -95.30},
                "status": "available"
            }
        ]
    }"#;

    #[test]
    fn test_load_and_find() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.json"), SCENARIO).unwrap();
        std::fs::write(dir.path().join("a.json"), SCENARIO).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a scenario").unwrap();

        let found = find_scenarios(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.json"));

        let scenario = Scenario::load(&found[1]).unwrap();
        assert_eq!(scenario.id, "gulf-coast");
        assert_eq!(scenario.assessments.len(), 1);
        assert_eq!(scenario.resources[0].quantity, 500);
        assert_eq!(scenario.vehicles[0].capacity_kg, 5000);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        assert!(scenario.validate().is_ok());

        scenario.assessments[0].confidence = 2.0;
        assert!(matches!(
            scenario.validate(),
            Err(ReliefError::InvalidInput(_))
        ));

        scenario.assessments[0].confidence = 0.9;
        let mut twice = scenario.resources[0].clone();
        twice.quantity = 20;
        scenario.resources.push(twice);
        match scenario.validate() {
            Err(ReliefError::InvalidInput(msg)) => assert!(msg.contains("wh-1")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        // The same kind at another facility is fine.
        scenario.resources[1].facility_id = "wh-2".to_owned();
        assert!(scenario.validate().is_ok());

        assert!(matches!(
            serde_json::from_str::<Scenario>(r#"{"id": "x"}"#).map_err(ReliefError::from),
            Err(ReliefError::Parse(_))
        ));
    }
}
