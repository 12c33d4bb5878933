//! Sensitive detectors and hit-collection bookkeeping.
//!
//! Each worker owns one [`SensitiveDetectorManager`]. Modules register
//! [`MultiFunctionalDetector`]s with it from
//! [`GeometryModule::construct_sd_and_field`](crate::module::GeometryModule::construct_sd_and_field)
//! and attach them to logical volumes by name. Every primitive scorer of a
//! detector yields one hit collection named `<detector>/<primitive>`.
//! Collection ids are handed out in registration order, so workers that run
//! the same construction sequence agree on every id.

use bl2sim_geometry::{LogicalId, VolumeStore};
use indexmap::IndexMap;
use thiserror::Error;

use crate::event::HitCollectionId;

/// Errors from sensitive-detector registration.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Sensitive detector '{0}' is already registered")]
    DuplicateDetector(String),

    #[error("Detector '{detector}' already has a primitive named '{primitive}'")]
    DuplicatePrimitive { detector: String, primitive: String },

    #[error("Sensitive detector not found: {0}")]
    UnknownDetector(String),

    #[error("No logical volume named '{0}' to attach a sensitive detector to")]
    UnknownVolume(String),
}

/// What a primitive scorer accumulates per copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    /// Summed deposited energy (MeV).
    EnergyDeposit,
}

/// A primitive scorer: one quantity, keyed by the copy number found at
/// `depth` levels up the touchable history (0 = the sensitive volume itself).
#[derive(Debug, Clone)]
pub struct PrimitiveScorer {
    pub name: String,
    pub kind: ScorerKind,
    pub depth: usize,
}

impl PrimitiveScorer {
    pub fn energy_deposit(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            kind: ScorerKind::EnergyDeposit,
            depth,
        }
    }
}

/// A sensitive detector made of primitive scorers.
#[derive(Debug, Clone)]
pub struct MultiFunctionalDetector {
    name: String,
    primitives: Vec<PrimitiveScorer>,
}

impl MultiFunctionalDetector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitives: Vec::new(),
        }
    }

    pub fn register_primitive(&mut self, scorer: PrimitiveScorer) -> Result<(), DetectorError> {
        if self.primitives.iter().any(|p| p.name == scorer.name) {
            return Err(DetectorError::DuplicatePrimitive {
                detector: self.name.clone(),
                primitive: scorer.name,
            });
        }
        self.primitives.push(scorer);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitives(&self) -> &[PrimitiveScorer] {
        &self.primitives
    }
}

/// Per-worker registry of sensitive detectors and their hit collections.
#[derive(Debug, Default)]
pub struct SensitiveDetectorManager {
    detectors: IndexMap<String, MultiFunctionalDetector>,
    collections: Vec<String>,
    attachments: Vec<(LogicalId, String)>,
}

impl SensitiveDetectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector and assign ids to its hit collections.
    pub fn add_new_detector(&mut self, detector: MultiFunctionalDetector) -> Result<(), DetectorError> {
        if self.detectors.contains_key(detector.name()) {
            return Err(DetectorError::DuplicateDetector(detector.name().to_string()));
        }
        for primitive in detector.primitives() {
            let collection = format!("{}/{}", detector.name(), primitive.name);
            log::debug!(
                "hit collection {} -> id {}",
                collection,
                self.collections.len()
            );
            self.collections.push(collection);
        }
        self.detectors.insert(detector.name().to_string(), detector);
        Ok(())
    }

    /// Attach a registered detector to every logical volume named
    /// `logical_name`.
    pub fn set_sensitive_detector(
        &mut self,
        volumes: &VolumeStore,
        logical_name: &str,
        detector: &str,
    ) -> Result<(), DetectorError> {
        if !self.detectors.contains_key(detector) {
            return Err(DetectorError::UnknownDetector(detector.to_string()));
        }
        let logical = volumes
            .logical_by_name(logical_name)
            .ok_or_else(|| DetectorError::UnknownVolume(logical_name.to_string()))?;
        self.attachments.retain(|(lv, _)| *lv != logical);
        self.attachments.push((logical, detector.to_string()));
        Ok(())
    }

    /// Resolve `<detector>/<primitive>` to its collection id.
    pub fn collection_id(&self, name: &str) -> Option<HitCollectionId> {
        self.collections
            .iter()
            .position(|c| c == name)
            .map(HitCollectionId::new)
    }

    pub fn collection_name(&self, id: HitCollectionId) -> Option<&str> {
        self.collections.get(id.index()).map(String::as_str)
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn detector(&self, name: &str) -> Option<&MultiFunctionalDetector> {
        self.detectors.get(name)
    }

    /// The detector attached to `logical`, if it is sensitive.
    pub fn detector_of(&self, logical: LogicalId) -> Option<&MultiFunctionalDetector> {
        self.attachments
            .iter()
            .find(|(lv, _)| *lv == logical)
            .and_then(|(_, name)| self.detectors.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl2sim_geometry::{Colour, Shape, Solid};

    fn bgo_like() -> MultiFunctionalDetector {
        let mut det = MultiFunctionalDetector::new("Crystal");
        det.register_primitive(PrimitiveScorer::energy_deposit("Edep", 1))
            .unwrap();
        det
    }

    #[test]
    fn test_collection_ids_follow_registration_order() {
        let mut sd = SensitiveDetectorManager::new();
        let mut first = MultiFunctionalDetector::new("A");
        first
            .register_primitive(PrimitiveScorer::energy_deposit("Edep", 0))
            .unwrap();
        first
            .register_primitive(PrimitiveScorer::energy_deposit("EdepOuter", 1))
            .unwrap();
        sd.add_new_detector(first).unwrap();
        sd.add_new_detector(bgo_like()).unwrap();

        assert_eq!(sd.collection_id("A/Edep"), Some(HitCollectionId::new(0)));
        assert_eq!(sd.collection_id("A/EdepOuter"), Some(HitCollectionId::new(1)));
        assert_eq!(sd.collection_id("Crystal/Edep"), Some(HitCollectionId::new(2)));
        assert_eq!(sd.collection_id("Crystal/Nope"), None);
        assert_eq!(sd.collection_name(HitCollectionId::new(2)), Some("Crystal/Edep"));
    }

    #[test]
    fn test_duplicate_detector_rejected() {
        let mut sd = SensitiveDetectorManager::new();
        sd.add_new_detector(bgo_like()).unwrap();
        assert!(matches!(
            sd.add_new_detector(bgo_like()),
            Err(DetectorError::DuplicateDetector(_))
        ));
        assert_eq!(sd.collection_count(), 1);
    }

    #[test]
    fn test_attach_to_named_volume() {
        let mut volumes = VolumeStore::new(100.0, "G4_Galactic").unwrap();
        let crystal = volumes
            .add_logical(Solid::new("Det_crystal", Shape::boxed(1.0, 1.0, 1.0)), "G4_BGO", Colour::Cyan)
            .unwrap();
        let mut sd = SensitiveDetectorManager::new();
        sd.add_new_detector(bgo_like()).unwrap();

        sd.set_sensitive_detector(&volumes, "Det_crystal", "Crystal")
            .unwrap();
        assert_eq!(sd.detector_of(crystal).map(|d| d.name()), Some("Crystal"));
        assert!(sd.detector_of(volumes.world()).is_none());

        assert!(matches!(
            sd.set_sensitive_detector(&volumes, "Missing", "Crystal"),
            Err(DetectorError::UnknownVolume(_))
        ));
        assert!(matches!(
            sd.set_sensitive_detector(&volumes, "Det_crystal", "Other"),
            Err(DetectorError::UnknownDetector(_))
        ));
    }
}
