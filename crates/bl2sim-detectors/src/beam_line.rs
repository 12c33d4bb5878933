//! Upstream beam line section.
//!
//! A steel tube with its vacuum core and a steel flange, ending 280 mm
//! upstream of the target. The vacuum core is offered as an envelope.

use bl2sim_core::module::{GeometryModule, ModuleError};
use bl2sim_geometry::units::{MM, UM};
use bl2sim_geometry::{Colour, LogicalId, Placement, Shape, Solid, VolumeStore};

const LENGTH: f64 = 125.0 * MM;
const FLANGE_WIDTH: f64 = 12.5 * MM;
const R_INNER: f64 = 23.5 * MM;
const R_OUTER: f64 = 25.0 * MM;
const FLANGE_R_OUTER: f64 = 50.0 * MM;
/// Distance from the target to the downstream end of the section.
const TARGET_DISTANCE: f64 = 280.0 * MM;
const TOLERANCE: f64 = 10.0 * UM;

pub struct BeamLine {
    name: String,
    mother: Option<String>,
}

impl BeamLine {
    pub const NAME: &'static str = "BeamLine";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.into(),
            mother: None,
        }
    }

    /// Place the module inside `mother`'s envelope, or in the world for
    /// `None`.
    pub fn with_mother(mut self, mother: Option<&str>) -> Self {
        self.mother = mother.map(String::from);
        self
    }
}

impl Default for BeamLine {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryModule for BeamLine {
    fn name(&self) -> &str {
        &self.name
    }

    fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }

    fn construct(
        &mut self,
        mother: LogicalId,
        volumes: &mut VolumeStore,
    ) -> Result<Option<LogicalId>, ModuleError> {
        let tube = volumes.add_logical(
            Solid::new(
                format!("{}_Tube", self.name),
                Shape::tube(R_INNER, R_OUTER, 0.5 * LENGTH - TOLERANCE),
            ),
            "Steel-316",
            Colour::Grey,
        )?;
        let vacuum = volumes.add_logical(
            Solid::new(
                format!("{}_vacuum", self.name),
                Shape::tube(0.0, R_INNER - TOLERANCE, 0.5 * LENGTH),
            ),
            "G4_Galactic",
            Colour::Invisible,
        )?;
        let flange = volumes.add_logical(
            Solid::new(
                format!("{}_flange", self.name),
                Shape::tube(R_OUTER + TOLERANCE, FLANGE_R_OUTER, 0.5 * FLANGE_WIDTH),
            ),
            "Steel-316",
            Colour::Grey,
        )?;

        let centre = -(0.5 * LENGTH + TARGET_DISTANCE);
        volumes.place(tube, mother, Placement::along_z(centre), 0)?;
        volumes.place(vacuum, mother, Placement::along_z(centre), 0)?;
        volumes.place(
            flange,
            mother,
            Placement::along_z(-(0.5 * FLANGE_WIDTH + TARGET_DISTANCE)),
            0,
        )?;

        Ok(Some(vacuum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_section_ends_upstream_of_target() {
        let mut volumes = VolumeStore::new(1000.0, "G4_Galactic").unwrap();
        let world = volumes.world();
        let mut beam_line = BeamLine::new();
        let envelope = beam_line.construct(world, &mut volumes).unwrap().unwrap();

        assert_eq!(volumes.logical(envelope).unwrap().name, "BeamLine_vacuum");
        let tube = volumes.logical_by_name("BeamLine_Tube").unwrap();
        let placement = &volumes.placements_of(tube).next().unwrap().placement;
        assert_abs_diff_eq!(placement.translation.z + 0.5 * LENGTH, -280.0, epsilon = 1e-9);
        assert_eq!(volumes.daughters_of(world).count(), 3);
    }
}
