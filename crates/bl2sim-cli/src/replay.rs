//! Transport engine that replays recorded events.
//!
//! The event file holds one JSON object per line:
//!
//! ```json
//! {"hits": {"BGOCrystal/Edep": {"0": 1.1, "3": 0.4}},
//!  "trajectories": [{"particle": "gamma", "initial_kinetic_energy": 0.511,
//!                    "points": [[0.5, -0.5, 0.1]]}]}
//! ```
//!
//! Hit collections are keyed by their full `detector/primitive` name and
//! resolved against each worker's sensitive detectors when replayed.
//! Event `n` of a run replays line `n`, so every run starts from the top
//! of the file.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use bl2sim_core::engine::{EngineError, TransportEngine};
use bl2sim_core::event::{EventRecord, HitsMap, Trajectory};
use bl2sim_core::sensitive::SensitiveDetectorManager;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
struct RecordedEvent {
    #[serde(default)]
    hits: BTreeMap<String, HitsMap>,
    #[serde(default)]
    trajectories: Vec<Trajectory>,
}

#[derive(Debug)]
pub struct ReplayEngine {
    name: String,
    events: Vec<RecordedEvent>,
}

impl ReplayEngine {
    /// Read every event in `path`. Blank lines are skipped.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open event file '{}'", path.display()))?;
        let events = parse_events(BufReader::new(file))
            .with_context(|| format!("Failed to read event file '{}'", path.display()))?;
        log::info!("loaded {} recorded events from '{}'", events.len(), path.display());
        Ok(Self {
            name: path.display().to_string(),
            events,
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn parse_events(reader: impl BufRead) -> anyhow::Result<Vec<RecordedEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: RecordedEvent =
            serde_json::from_str(&line).with_context(|| format!("line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

impl TransportEngine for ReplayEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_events(&self) -> Option<u64> {
        Some(self.events.len() as u64)
    }

    fn simulate(
        &self,
        event_id: u64,
        detectors: &SensitiveDetectorManager,
    ) -> Result<EventRecord, EngineError> {
        let recorded = usize::try_from(event_id)
            .ok()
            .and_then(|i| self.events.get(i))
            .ok_or(EngineError::OutOfEvents {
                requested: event_id,
                available: self.events.len() as u64,
            })?;

        let mut event = EventRecord::new(event_id);
        for (name, hits) in &recorded.hits {
            let id = detectors
                .collection_id(name)
                .ok_or_else(|| EngineError::UnknownCollection(name.clone()))?;
            event.insert_hits(id, hits.clone());
        }
        for trajectory in &recorded.trajectories {
            event.push_trajectory(trajectory.clone());
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl2sim_core::sensitive::{MultiFunctionalDetector, PrimitiveScorer};
    use std::io::Write;

    fn detectors() -> SensitiveDetectorManager {
        let mut manager = SensitiveDetectorManager::new();
        let mut detector = MultiFunctionalDetector::new("BGOCrystal");
        detector
            .register_primitive(PrimitiveScorer::energy_deposit("Edep", 1))
            .unwrap();
        manager.add_new_detector(detector).unwrap();
        manager
    }

    fn engine(lines: &str) -> ReplayEngine {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        ReplayEngine::open(file.path()).unwrap()
    }

    #[test]
    fn test_replay_resolves_collections() {
        let engine = engine(concat!(
            r#"{"hits": {"BGOCrystal/Edep": {"0": 1.1, "3": 0.4}}}"#,
            "\n\n",
            r#"{"trajectories": [{"particle": "gamma", "initial_kinetic_energy": 0.511, "points": [[1.0, 2.0, 3.0]]}]}"#,
            "\n",
        ));
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.available_events(), Some(2));

        let detectors = detectors();
        let id = detectors.collection_id("BGOCrystal/Edep").unwrap();

        let first = engine.simulate(0, &detectors).unwrap();
        let hits = first.hits(id).unwrap();
        assert_eq!(hits.get(0), Some(1.1));
        assert_eq!(hits.get(3), Some(0.4));
        assert!(first.trajectories().is_empty());

        let second = engine.simulate(1, &detectors).unwrap();
        assert!(second.hits(id).is_none());
        assert_eq!(second.trajectories()[0].origin(), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_unknown_collection() {
        let engine = engine(r#"{"hits": {"Clover/Edep": {"0": 1.0}}}"#);
        let err = engine.simulate(0, &detectors()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCollection(name) if name == "Clover/Edep"));
    }

    #[test]
    fn test_past_the_end() {
        let engine = engine("{}\n");
        assert!(matches!(
            engine.simulate(1, &detectors()),
            Err(EngineError::OutOfEvents { requested: 1, available: 1 })
        ));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}\n{\"hits\": 3}\n").unwrap();
        let err = ReplayEngine::open(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
