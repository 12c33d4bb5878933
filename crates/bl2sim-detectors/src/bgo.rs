//! The BGO summing detector.
//!
//! Six trapezoidal BGO crystals, each in an aluminium shielding, surround
//! the beam axis at 60° steps inside a steel enclosure with end caps cut for
//! the photomultipliers. A primitive energy-deposit scorer on the crystals
//! reports per-crystal totals keyed by the shielding copy number (0..5).
//!
//! Each event produces one `EdepBGO` row: the six crystal energies, their
//! sum, and the creation point of the event's annihilation photon, if the
//! correlator found one.
//!
//! Dimensions follow the manufacturer's drawing; a few were estimated.
//! Volumes without a description in the drawing are assumed empty.

use std::sync::OnceLock;

use bl2sim_core::event::{EventRecord, HitCollectionId};
use bl2sim_core::module::{GeometryModule, ModuleError, PositionTagger};
use bl2sim_core::output::{NtupleSchema, OutputRow};
use bl2sim_core::sensitive::{MultiFunctionalDetector, PrimitiveScorer, SensitiveDetectorManager};
use bl2sim_geometry::transform::rotate_z;
use bl2sim_geometry::units::{DEG, MEV, MM};
use bl2sim_geometry::{Colour, LogicalId, Placement, Shape, Solid, VolumeStore};
use nalgebra::Vector3;

/// Number of crystals.
pub const CRYSTALS: usize = 6;

/// Column of the energy sum; crystal `i` is column `i`.
pub const SUM_COLUMN: usize = CRYSTALS;
/// First of the three position columns.
pub const POSITION_COLUMN: usize = CRYSTALS + 1;

const DETECTOR_NAME: &str = "BGOCrystal";
const PRIMITIVE_NAME: &str = "Edep";
const NTUPLE_NAME: &str = "EdepBGO";

// Enclosure
const INNER_TUBE_R_IN: f64 = 0.5 * 60.0 * MM;
const INNER_TUBE_R_OUT: f64 = INNER_TUBE_R_IN + 0.8 * MM;
const ENCLOSURE_LENGTH: f64 = (306.0 - 22.0) * MM;
const MANTLE_R_IN: f64 = 0.5 * 240.0 * MM;
const MANTLE_R_OUT: f64 = 0.5 * 246.0 * MM;
const OUTER_CAP_R_IN: f64 = 0.5 * 60.0 * MM;
const CAP_R_OUT: f64 = 0.5 * 290.0 * MM;
const INNER_CAP_R_IN: f64 = 0.5 * 246.0 * MM;
const CAP_THICKNESS: f64 = 11.0 * MM;

// Crystals and their shielding
const CRYSTAL_LENGTH: f64 = 284.0 * MM;
const TRAP_SHORT: f64 = 34.4 * MM;
const TRAP_LONG: f64 = 115.2 * MM;
const TRAP_HEIGHT: f64 = 70.0 * MM;
const SHRINKING: f64 = 0.2 * MM;
/// Distance of the shielding centre from the beam axis.
const SHIELDING_OFFSET: f64 = (30.8 + 0.5 * 70.0) * MM;

// PMT holes in the outer end caps
const PMT_HOLE_RADIUS: f64 = 0.5 * 53.0 * MM;
const PMT_CIRCLE_RADIUS: f64 = 74.0 * MM;
const CUTTING_TOLERANCE: f64 = 1.0 * MM;

pub struct BgoDetector {
    mother: Option<String>,
    hit_collection: OnceLock<HitCollectionId>,
}

impl BgoDetector {
    pub const NAME: &'static str = "BGODetector";

    pub fn new() -> Self {
        Self {
            mother: None,
            hit_collection: OnceLock::new(),
        }
    }

    /// Place the module inside `mother`'s envelope, or in the world for
    /// `None`.
    pub fn with_mother(mut self, mother: Option<&str>) -> Self {
        self.mother = mother.map(String::from);
        self
    }

    /// Name of the crystals' logical volume.
    pub fn crystal_volume() -> String {
        format!("{}_crystal", Self::NAME)
    }

    /// Full name of the energy-deposit hit collection.
    pub fn hit_collection_name() -> String {
        format!("{}/{}", DETECTOR_NAME, PRIMITIVE_NAME)
    }

    /// Resolve the hit collection id on first use.
    ///
    /// Every worker registers its sensitive detectors in the same order, so
    /// the id resolved by one worker is valid for all of them.
    fn hit_collection(&self, detectors: &SensitiveDetectorManager) -> Result<HitCollectionId, ModuleError> {
        if let Some(id) = self.hit_collection.get() {
            return Ok(*id);
        }
        let name = Self::hit_collection_name();
        let id = detectors
            .collection_id(&name)
            .ok_or(ModuleError::UnresolvedHitCollection(name))?;
        Ok(*self.hit_collection.get_or_init(|| id))
    }

    fn outer_cap(&self) -> Solid {
        let cap = Solid::new(
            format!("{}_outerCap", Self::NAME),
            Shape::tube(OUTER_CAP_R_IN, CAP_R_OUT, 0.5 * CAP_THICKNESS),
        );
        let cutter = Solid::new(
            format!("{}_pmtHoleCutter", Self::NAME),
            Shape::tube(0.0, PMT_HOLE_RADIUS, 0.5 * CAP_THICKNESS + CUTTING_TOLERANCE),
        );
        (0..CRYSTALS).fold(cap, |solid, i| {
            let angle = i as f64 * 60.0 * DEG;
            let hole = rotate_z(Vector3::new(PMT_CIRCLE_RADIUS, 0.0, 0.0), angle);
            solid.subtract(
                format!("{}_endSteel", Self::NAME),
                &cutter,
                Placement::identity().rotate_z(angle).with_translation(hole),
            )
        })
    }
}

impl Default for BgoDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryModule for BgoDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }

    fn construct(
        &mut self,
        mother: LogicalId,
        volumes: &mut VolumeStore,
    ) -> Result<Option<LogicalId>, ModuleError> {
        let crystal = volumes.add_logical(
            Solid::new(
                Self::crystal_volume(),
                Shape::trd(
                    0.5 * CRYSTAL_LENGTH,
                    0.5 * CRYSTAL_LENGTH,
                    0.5 * (TRAP_LONG - SHRINKING * (60.0 * DEG).sin()),
                    0.5 * (TRAP_SHORT - SHRINKING * (60.0 * DEG).sin()),
                    0.5 * (TRAP_HEIGHT - SHRINKING * (60.0 * DEG).cos()),
                ),
            ),
            "G4_BGO",
            Colour::Cyan,
        )?;
        let shielding = volumes.add_logical(
            Solid::new(
                format!("{}_shielding", Self::NAME),
                Shape::trd(
                    0.5 * CRYSTAL_LENGTH,
                    0.5 * CRYSTAL_LENGTH,
                    0.5 * TRAP_LONG,
                    0.5 * TRAP_SHORT,
                    0.5 * TRAP_HEIGHT,
                ),
            ),
            "G4_Al",
            Colour::Red,
        )?;
        let inner_tube = volumes.add_logical(
            Solid::new(
                format!("{}_innerTube", Self::NAME),
                Shape::tube(INNER_TUBE_R_IN, INNER_TUBE_R_OUT, 0.5 * ENCLOSURE_LENGTH),
            ),
            "G4_Al",
            Colour::Grey,
        )?;
        let mantle = volumes.add_logical(
            Solid::new(
                format!("{}_mantle", Self::NAME),
                Shape::tube(MANTLE_R_IN, MANTLE_R_OUT, 0.5 * ENCLOSURE_LENGTH),
            ),
            "Steel-316",
            Colour::Grey,
        )?;
        let outer_cap = volumes.add_logical(self.outer_cap(), "Steel-316", Colour::Grey)?;
        let inner_cap = volumes.add_logical(
            Solid::new(
                format!("{}_innerCap", Self::NAME),
                Shape::tube(INNER_CAP_R_IN, CAP_R_OUT, 0.5 * CAP_THICKNESS),
            ),
            "Steel-316",
            Colour::Grey,
        )?;

        // The scorer reads the shielding's copy number, one level above the
        // crystal.
        volumes.place(crystal, shielding, Placement::identity(), 0)?;
        for i in 0..CRYSTALS {
            let angle = i as f64 * 60.0 * DEG;
            let position = rotate_z(Vector3::new(-SHIELDING_OFFSET, 0.0, 0.0), angle);
            let placement = Placement::identity()
                .rotate_y(90.0 * DEG)
                .rotate_z(angle)
                .with_translation(position);
            volumes.place(shielding, mother, placement, i as i32)?;
        }

        volumes.place(inner_tube, mother, Placement::identity(), 0)?;
        volumes.place(mantle, mother, Placement::identity(), 0)?;
        let outer_z = 0.5 * ENCLOSURE_LENGTH + 0.5 * CAP_THICKNESS;
        let inner_z = 0.5 * ENCLOSURE_LENGTH - 0.5 * CAP_THICKNESS;
        for (copy_no, sign) in [(0, -1.0), (1, 1.0)] {
            volumes.place(outer_cap, mother, Placement::along_z(sign * outer_z), copy_no)?;
            volumes.place(inner_cap, mother, Placement::along_z(sign * inner_z), copy_no)?;
        }

        Ok(None)
    }

    fn construct_sd_and_field(
        &self,
        volumes: &VolumeStore,
        detectors: &mut SensitiveDetectorManager,
    ) -> Result<(), ModuleError> {
        let mut detector = MultiFunctionalDetector::new(DETECTOR_NAME);
        detector.register_primitive(PrimitiveScorer::energy_deposit(PRIMITIVE_NAME, 1))?;
        detectors.add_new_detector(detector)?;
        detectors.set_sensitive_detector(volumes, &Self::crystal_volume(), DETECTOR_NAME)?;
        Ok(())
    }

    fn setup_output(&self) -> Option<NtupleSchema> {
        let mut schema = NtupleSchema::new(NTUPLE_NAME, "Energy Deposition in BGO detector");
        for i in 1..=CRYSTALS {
            schema = schema.column(format!("BGO{}", i));
        }
        Some(schema.column("BGOsum").column("X").column("Y").column("Z"))
    }

    fn fill_output(
        &self,
        event: &EventRecord,
        detectors: &SensitiveDetectorManager,
        row: &mut OutputRow,
    ) -> Result<(), ModuleError> {
        let id = self.hit_collection(detectors)?;

        let mut edep = [0.0; CRYSTALS];
        if let Some(hits) = event.hits(id) {
            for (copy_no, energy) in hits.iter() {
                let index = usize::try_from(copy_no)
                    .ok()
                    .filter(|i| *i < CRYSTALS)
                    .ok_or(ModuleError::CopyIndexOutOfRange {
                        copy_no,
                        copies: CRYSTALS,
                    })?;
                edep[index] = energy;
            }
        }

        for (column, energy) in edep.iter().enumerate() {
            row.set(column, energy / MEV)?;
        }
        row.set(SUM_COLUMN, edep.iter().sum::<f64>() / MEV)?;
        Ok(())
    }

    fn as_position_tagger(&self) -> Option<&dyn PositionTagger> {
        Some(self)
    }
}

impl PositionTagger for BgoDetector {
    fn tag_position(&self, position: [f64; 3], row: &mut OutputRow) -> Result<(), ModuleError> {
        for (offset, value) in position.iter().enumerate() {
            row.set(POSITION_COLUMN + offset, value / MM)?;
        }
        Ok(())
    }
}
