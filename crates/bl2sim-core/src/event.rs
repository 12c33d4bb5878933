//! Completed-event records handed over by the transport engine.
//!
//! An [`EventRecord`] is only borrowed for the duration of one end-of-event
//! callback. The core never keeps references into it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Index of a hit collection, assigned by the
/// [`SensitiveDetectorManager`](crate::sensitive::SensitiveDetectorManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitCollectionId(usize);

impl HitCollectionId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-event map from copy number to a scored quantity.
///
/// The engine accumulates every step inside the same copy into one entry,
/// so readers see final per-copy totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitsMap(BTreeMap<i32, f64>);

impl HitsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `value` into `copy_no`.
    pub fn add(&mut self, copy_no: i32, value: f64) {
        *self.0.entry(copy_no).or_insert(0.0) += value;
    }

    pub fn get(&self, copy_no: i32) -> Option<f64> {
        self.0.get(&copy_no).copied()
    }

    /// Entries in ascending copy-number order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(i32, f64)> for HitsMap {
    fn from_iter<I: IntoIterator<Item = (i32, f64)>>(iter: I) -> Self {
        let mut map = HitsMap::new();
        for (copy_no, value) in iter {
            map.add(copy_no, value);
        }
        map
    }
}

/// Recorded path of one particle through the geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Particle species, e.g. `gamma`, `e+`.
    pub particle: String,
    /// Kinetic energy at creation (MeV).
    pub initial_kinetic_energy: f64,
    /// Trajectory points in order (mm). The first point is the origin.
    #[serde(default)]
    pub points: Vec<[f64; 3]>,
}

impl Trajectory {
    pub fn new(particle: impl Into<String>, initial_kinetic_energy: f64, points: Vec<[f64; 3]>) -> Self {
        Self {
            particle: particle.into(),
            initial_kinetic_energy,
            points,
        }
    }

    /// Position where the particle was created.
    pub fn origin(&self) -> Option<[f64; 3]> {
        self.points.first().copied()
    }
}

/// Everything the engine exposes about one completed event.
#[derive(Debug, Clone, Default)]
pub struct EventRecord {
    event_id: u64,
    hits: HashMap<HitCollectionId, HitsMap>,
    trajectories: Vec<Trajectory>,
}

impl EventRecord {
    pub fn new(event_id: u64) -> Self {
        Self {
            event_id,
            ..Default::default()
        }
    }

    pub fn with_hits(mut self, id: HitCollectionId, hits: HitsMap) -> Self {
        self.insert_hits(id, hits);
        self
    }

    pub fn with_trajectory(mut self, trajectory: Trajectory) -> Self {
        self.trajectories.push(trajectory);
        self
    }

    pub fn insert_hits(&mut self, id: HitCollectionId, hits: HitsMap) {
        self.hits.insert(id, hits);
    }

    pub fn push_trajectory(&mut self, trajectory: Trajectory) {
        self.trajectories.push(trajectory);
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    /// Hit collection `id`, or `None` if nothing was scored into it.
    pub fn hits(&self, id: HitCollectionId) -> Option<&HitsMap> {
        self.hits.get(&id)
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }
}
