//! The geometry module abstraction.
//!
//! A [`GeometryModule`] contributes one sub-tree of volumes to the detector
//! model and, optionally, sensitive detectors and a per-event output row.
//! Every capability beyond [`construct`](GeometryModule::construct) has a
//! no-op default, so a passive module (beam pipe, chamber) implements only
//! `name` and `construct`.
//!
//! Lifecycle, driven by the [`GeometryRegistry`](crate::registry::GeometryRegistry):
//!
//! 1. `configure` any number of times while the geometry is still open.
//! 2. `construct` exactly once, on the setup thread.
//! 3. `construct_sd_and_field` once per worker.
//! 4. `setup_output` once per run and worker.
//! 5. `fill_output` once per event.

use bl2sim_geometry::{GeometryError, LogicalId, VolumeStore};
use thiserror::Error;

use crate::event::EventRecord;
use crate::output::{NtupleSchema, OutputError, OutputRow};
use crate::sensitive::{DetectorError, SensitiveDetectorManager};

/// Errors raised by a module during construction or scoring.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Hit collection '{0}' is not registered; sensitive detectors must be attached before events are scored")]
    UnresolvedHitCollection(String),

    #[error("Copy number {copy_no} is outside the {copies} scoring copies")]
    CopyIndexOutOfRange { copy_no: i32, copies: usize },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Sensitive detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

impl ModuleError {
    /// Whether the error signals a broken call order or a broken model
    /// rather than a problem with one event's data.
    pub fn is_fatal(&self) -> bool {
        match self {
            ModuleError::UnresolvedHitCollection(_)
            | ModuleError::Geometry(_)
            | ModuleError::Detector(_) => true,
            ModuleError::CopyIndexOutOfRange { .. } | ModuleError::Output(_) => false,
        }
    }
}

/// Rejected runtime configuration. Callers log these and carry on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("Unknown command for {module}: '{option}'")]
    UnknownOption { module: String, option: String },

    #[error("Invalid value '{value}' for {module}/{option}; expected one of: {expected}")]
    InvalidValue {
        module: String,
        option: String,
        value: String,
        expected: String,
    },

    #[error("No geometry module named '{0}'")]
    UnknownModule(String),

    #[error("Geometry is already constructed; option for '{0}' ignored")]
    GeometryFrozen(String),
}

impl ConfigureError {
    pub fn unknown_option(module: &str, option: &str) -> Self {
        ConfigureError::UnknownOption {
            module: module.to_string(),
            option: option.to_string(),
        }
    }

    pub fn invalid_value(module: &str, option: &str, value: &str, expected: &[&str]) -> Self {
        ConfigureError::InvalidValue {
            module: module.to_string(),
            option: option.to_string(),
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

/// An independently built part of the detector model.
pub trait GeometryModule: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Name of the module whose envelope volume is this module's mother.
    /// `None` places the module directly in the world.
    fn mother(&self) -> Option<&str> {
        None
    }

    /// Build this module's volumes inside `mother`.
    ///
    /// Returns the envelope volume other modules may use as their mother,
    /// if the module offers one. The store keeps ownership of everything
    /// built here. Called exactly once.
    fn construct(
        &mut self,
        mother: LogicalId,
        volumes: &mut VolumeStore,
    ) -> Result<Option<LogicalId>, ModuleError>;

    /// Register sensitive detectors with this worker's manager and attach
    /// them to this module's volumes. Called once per worker.
    fn construct_sd_and_field(
        &self,
        volumes: &VolumeStore,
        detectors: &mut SensitiveDetectorManager,
    ) -> Result<(), ModuleError> {
        let _ = (volumes, detectors);
        Ok(())
    }

    /// Declare this module's per-event output row, if it has one.
    fn setup_output(&self) -> Option<NtupleSchema> {
        None
    }

    /// Write this event's values into the staged `row`.
    ///
    /// `row` has been reset to zeros before the call; columns the module
    /// has no data for keep that sentinel.
    fn fill_output(
        &self,
        event: &EventRecord,
        detectors: &SensitiveDetectorManager,
        row: &mut OutputRow,
    ) -> Result<(), ModuleError> {
        let _ = (event, detectors, row);
        Ok(())
    }

    /// Apply a string-keyed runtime option.
    fn configure(&mut self, option: &str, value: &str) -> Result<(), ConfigureError> {
        let _ = value;
        Err(ConfigureError::unknown_option(self.name(), option))
    }

    /// The position-tagging entry point, for modules that accept one.
    fn as_position_tagger(&self) -> Option<&dyn PositionTagger> {
        None
    }
}

/// Accepts an externally determined position for the current event's row.
pub trait PositionTagger: Send + Sync {
    fn tag_position(&self, position: [f64; 3], row: &mut OutputRow) -> Result<(), ModuleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passive;

    impl GeometryModule for Passive {
        fn name(&self) -> &str {
            "Passive"
        }

        fn construct(
            &mut self,
            _mother: LogicalId,
            _volumes: &mut VolumeStore,
        ) -> Result<Option<LogicalId>, ModuleError> {
            Ok(None)
        }
    }

    #[test]
    fn test_default_capabilities_are_noops() {
        let mut module = Passive;
        let volumes = VolumeStore::new(10.0, "G4_Galactic").unwrap();
        let mut sd = SensitiveDetectorManager::new();
        assert!(module.construct_sd_and_field(&volumes, &mut sd).is_ok());
        assert_eq!(sd.collection_count(), 0);
        assert!(module.setup_output().is_none());
        assert!(module.as_position_tagger().is_none());
        assert_eq!(
            module.configure("target", "graphite"),
            Err(ConfigureError::unknown_option("Passive", "target"))
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ModuleError::UnresolvedHitCollection("X/Edep".into()).is_fatal());
        assert!(!ModuleError::CopyIndexOutOfRange { copy_no: 9, copies: 6 }.is_fatal());
    }
}
