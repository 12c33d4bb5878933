//! # BL2 Detectors
//!
//! Geometry modules of the solid-target station on beam line 2 at LUNA-400.
//! Every module implements [`GeometryModule`] and can be registered with a
//! [`GeometryRegistry`](bl2sim_core::registry::GeometryRegistry) by name.
//!
//! | Module name | Type | Scoring |
//! |-------------|------|---------|
//! | `BeamLine` | [`beam_line::BeamLine`] | none |
//! | `TargetChamberO17` | [`target_chamber::TargetChamber`] | none |
//! | `TargetChamberMg25` | [`target_chamber::TargetChamber`] | none |
//! | `TargetHolder` | [`target_holder::TargetHolder`] | none |
//! | `BGODetector` | [`bgo::BgoDetector`] | `EdepBGO` ntuple |

pub mod beam_line;
pub mod bgo;
pub mod target_chamber;
pub mod target_holder;

use bl2sim_core::module::GeometryModule;
use thiserror::Error;

use crate::beam_line::BeamLine;
use crate::bgo::BgoDetector;
use crate::target_chamber::TargetChamber;
use crate::target_holder::TargetHolder;

/// Names accepted by [`build_module`].
pub const MODULE_NAMES: [&str; 5] = [
    "BeamLine",
    "TargetChamberO17",
    "TargetChamberMg25",
    "TargetHolder",
    "BGODetector",
];

#[derive(Debug, Error)]
pub enum DetectorsError {
    #[error("Unknown geometry module '{name}'; available: {}", MODULE_NAMES.join(", "))]
    UnknownModule { name: String },
}

/// Build the module called `name`, placed inside `mother`'s envelope if
/// given.
pub fn build_module(name: &str, mother: Option<&str>) -> Result<Box<dyn GeometryModule>, DetectorsError> {
    let module: Box<dyn GeometryModule> = match name {
        "BeamLine" => Box::new(BeamLine::new().with_mother(mother)),
        "TargetChamberO17" => Box::new(TargetChamber::o17().with_mother(mother)),
        "TargetChamberMg25" => Box::new(TargetChamber::mg25().with_mother(mother)),
        "TargetHolder" => Box::new(TargetHolder::new().with_mother(mother)),
        "BGODetector" => Box::new(BgoDetector::new().with_mother(mother)),
        _ => {
            return Err(DetectorsError::UnknownModule {
                name: name.to_string(),
            })
        }
    };
    Ok(module)
}

/// The O17 measurement setup, in registration order.
pub fn o17_setup() -> Vec<Box<dyn GeometryModule>> {
    vec![
        Box::new(BeamLine::new()),
        Box::new(TargetChamber::o17()),
        Box::new(TargetHolder::new()),
        Box::new(BgoDetector::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_name_builds() {
        for name in MODULE_NAMES {
            let module = build_module(name, None).unwrap();
            assert_eq!(module.name(), name);
            assert_eq!(module.mother(), None);
        }
    }

    #[test]
    fn test_mother_is_kept() {
        for name in MODULE_NAMES {
            let module = build_module(name, Some("BeamLine")).unwrap();
            assert_eq!(module.name(), name);
            assert_eq!(module.mother(), Some("BeamLine"));
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = build_module("Clover", None).err().unwrap();
        assert!(err.to_string().contains("BGODetector"));
    }
}
