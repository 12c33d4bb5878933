//! Annihilation-photon tagging.
//!
//! After the rows of an event are staged, [`EventCorrelator`] scans the
//! event's trajectories for the first photon born with an energy inside a
//! narrow window around the 511 keV annihilation line, and forwards that
//! photon's creation point to a target module's position columns.

use serde::Deserialize;

use crate::event::{EventRecord, Trajectory};
use crate::output::NtupleBook;
use crate::registry::{GeometryRegistry, RegistryError};

/// Which trajectories count as annihilation photons, and where their
/// origins are sent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Run the correlator at all. Disable for setups without a
    /// position-tagging module.
    pub enabled: bool,
    /// Module receiving the position.
    pub target: String,
    /// Particle species to match.
    pub particle: String,
    /// Open energy window `(low, high)` in MeV.
    pub window_mev: [f64; 2],
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: "BGODetector".into(),
            particle: "gamma".into(),
            window_mev: [0.51, 0.52],
        }
    }
}

/// First-match-wins search for an annihilation photon.
#[derive(Debug, Clone, Default)]
pub struct EventCorrelator {
    config: CorrelatorConfig,
}

impl EventCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Whether `trajectory` is a photon in the energy window. Both window
    /// edges are excluded.
    pub fn matches(&self, trajectory: &Trajectory) -> bool {
        let [low, high] = self.config.window_mev;
        trajectory.particle == self.config.particle
            && trajectory.initial_kinetic_energy > low
            && trajectory.initial_kinetic_energy < high
    }

    /// Creation point of the first matching trajectory.
    ///
    /// A matching trajectory without any recorded point is skipped and the
    /// scan continues.
    pub fn find_emission(&self, trajectories: &[Trajectory]) -> Option<[f64; 3]> {
        trajectories
            .iter()
            .filter(|t| self.matches(t))
            .find_map(|t| {
                let origin = t.origin();
                if origin.is_none() {
                    log::debug!("matching {} trajectory has no points, skipped", t.particle);
                }
                origin
            })
    }

    /// Check that the target exists, accepts positions and owns an ntuple
    /// in `book`. Run once per worker before the first event.
    pub fn validate(&self, registry: &GeometryRegistry, book: &NtupleBook) -> Result<(), RegistryError> {
        registry.position_tagger(&self.config.target)?;
        if book.binding(&self.config.target).is_none() {
            return Err(RegistryError::MissingCapability {
                module: self.config.target.clone(),
                capability: "an output ntuple",
            });
        }
        Ok(())
    }

    /// Tag the target's staged row with this event's emission point.
    ///
    /// Returns the forwarded position, or `None` when no trajectory
    /// matched and nothing was forwarded.
    pub fn process(
        &self,
        event: &EventRecord,
        registry: &GeometryRegistry,
        book: &mut NtupleBook,
    ) -> Result<Option<[f64; 3]>, RegistryError> {
        let Some(position) = self.find_emission(event.trajectories()) else {
            return Ok(None);
        };

        let tagger = registry.position_tagger(&self.config.target)?;
        let id = book
            .binding(&self.config.target)
            .ok_or_else(|| RegistryError::MissingCapability {
                module: self.config.target.clone(),
                capability: "an output ntuple",
            })?;
        let row = book.row_mut(id)?;
        if let Err(err) = tagger.tag_position(position, row) {
            if err.is_fatal() {
                return Err(RegistryError::Module {
                    module: self.config.target.clone(),
                    source: err,
                });
            }
            log::warn!("event {}: position not tagged: {}", event.event_id(), err);
        }
        log::debug!(
            "event {}: annihilation photon from ({:.2}, {:.2}, {:.2}) mm",
            event.event_id(),
            position[0],
            position[1],
            position[2]
        );
        Ok(Some(position))
    }
}
