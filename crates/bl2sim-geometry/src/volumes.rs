//! The volume arena.
//!
//! The [`VolumeStore`] owns every logical volume and physical placement of
//! the detector model. Everything else refers to volumes through the
//! [`LogicalId`] and [`PhysicalId`] indices it hands out, which stay valid
//! for the lifetime of the store. Nothing is ever removed.

use std::fmt;

use crate::solids::{GeometryError, Solid};
use crate::transform::Placement;

/// Handle to a logical volume in a [`VolumeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(usize);

/// Handle to a physical placement in a [`VolumeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalId(usize);

impl LogicalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl PhysicalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lv#{}", self.0)
    }
}

/// Display colour, kept for geometry summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colour {
    #[default]
    Grey,
    White,
    Cyan,
    Red,
    Blue,
    Green,
    Brown,
    Yellow,
    Invisible,
}

/// A solid paired with a material.
#[derive(Debug, Clone)]
pub struct LogicalVolume {
    pub name: String,
    pub solid: Solid,
    /// Material name as known to the engine's material table.
    pub material: String,
    pub colour: Colour,
}

/// One placed copy of a logical volume inside a mother logical volume.
#[derive(Debug, Clone)]
pub struct PhysicalVolume {
    pub name: String,
    pub logical: LogicalId,
    pub mother: LogicalId,
    pub placement: Placement,
    pub copy_no: i32,
}

/// Arena of logical and physical volumes, rooted at the world volume.
#[derive(Debug)]
pub struct VolumeStore {
    logicals: Vec<LogicalVolume>,
    physicals: Vec<PhysicalVolume>,
    world: LogicalId,
}

impl VolumeStore {
    /// Create a store whose world is a box of the given half-length.
    pub fn new(world_half_length: f64, world_material: &str) -> Result<Self, GeometryError> {
        let solid = Solid::new(
            "World",
            crate::solids::Shape::boxed(world_half_length, world_half_length, world_half_length),
        )
        .validated()?;
        let world = LogicalVolume {
            name: "World".into(),
            solid,
            material: world_material.into(),
            colour: Colour::Invisible,
        };
        Ok(Self {
            logicals: vec![world],
            physicals: Vec::new(),
            world: LogicalId(0),
        })
    }

    pub fn world(&self) -> LogicalId {
        self.world
    }

    /// Add a logical volume. Names must be unique.
    pub fn add_logical(
        &mut self,
        solid: Solid,
        material: &str,
        colour: Colour,
    ) -> Result<LogicalId, GeometryError> {
        let solid = solid.validated()?;
        if self.logical_by_name(&solid.name).is_some() {
            return Err(GeometryError::DuplicateLogicalVolume(solid.name));
        }
        let id = LogicalId(self.logicals.len());
        self.logicals.push(LogicalVolume {
            name: solid.name.clone(),
            solid,
            material: material.into(),
            colour,
        });
        Ok(id)
    }

    /// Place `logical` into `mother` with the given copy number.
    pub fn place(
        &mut self,
        logical: LogicalId,
        mother: LogicalId,
        placement: Placement,
        copy_no: i32,
    ) -> Result<PhysicalId, GeometryError> {
        let name = self.logical(logical)?.name.clone();
        self.logical(mother)?;
        let id = PhysicalId(self.physicals.len());
        log::trace!("placing {} (copy {}) into {}", name, copy_no, mother);
        self.physicals.push(PhysicalVolume {
            name,
            logical,
            mother,
            placement,
            copy_no,
        });
        Ok(id)
    }

    pub fn logical(&self, id: LogicalId) -> Result<&LogicalVolume, GeometryError> {
        self.logicals
            .get(id.0)
            .ok_or(GeometryError::InvalidVolumeId(id.0))
    }

    pub fn physical(&self, id: PhysicalId) -> Result<&PhysicalVolume, GeometryError> {
        self.physicals
            .get(id.0)
            .ok_or(GeometryError::InvalidVolumeId(id.0))
    }

    pub fn logical_by_name(&self, name: &str) -> Option<LogicalId> {
        self.logicals
            .iter()
            .position(|lv| lv.name == name)
            .map(LogicalId)
    }

    /// All placements whose logical volume is `logical`.
    pub fn placements_of(&self, logical: LogicalId) -> impl Iterator<Item = &PhysicalVolume> {
        self.physicals.iter().filter(move |pv| pv.logical == logical)
    }

    /// All placements directly inside `mother`.
    pub fn daughters_of(&self, mother: LogicalId) -> impl Iterator<Item = &PhysicalVolume> {
        self.physicals.iter().filter(move |pv| pv.mother == mother)
    }

    pub fn logical_count(&self) -> usize {
        self.logicals.len()
    }

    pub fn physical_count(&self) -> usize {
        self.physicals.len()
    }

    /// Indented tree of placements below the world, one line per placement.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let world = &self.logicals[self.world.0];
        out.push_str(&format!("{} [{}]\n", world.name, world.material));
        self.summarise_daughters(self.world, 1, &mut out);
        out
    }

    fn summarise_daughters(&self, mother: LogicalId, depth: usize, out: &mut String) {
        for pv in self.daughters_of(mother) {
            let lv = &self.logicals[pv.logical.0];
            let t = pv.placement.translation;
            let volume = lv
                .solid
                .shape
                .cubic_volume()
                .map(|v| format!("{:.1} cm3", v / 1000.0))
                .unwrap_or_else(|| "boolean".into());
            out.push_str(&format!(
                "{}{} #{} [{}] at ({:.1}, {:.1}, {:.1}) mm, {}\n",
                "  ".repeat(depth),
                pv.name,
                pv.copy_no,
                lv.material,
                t.x,
                t.y,
                t.z,
                volume
            ));
            self.summarise_daughters(pv.logical, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solids::Shape;

    fn store() -> VolumeStore {
        VolumeStore::new(1000.0, "G4_Galactic").unwrap()
    }

    #[test]
    fn test_world_exists() {
        let store = store();
        assert_eq!(store.logical(store.world()).unwrap().name, "World");
        assert_eq!(store.logical_by_name("World"), Some(store.world()));
    }

    #[test]
    fn test_duplicate_logical_rejected() {
        let mut store = store();
        let solid = Solid::new("Tube", Shape::tube(1.0, 2.0, 3.0));
        store.add_logical(solid.clone(), "G4_Al", Colour::Grey).unwrap();
        let err = store.add_logical(solid, "G4_Al", Colour::Grey).unwrap_err();
        assert!(matches!(err, GeometryError::DuplicateLogicalVolume(_)));
    }

    #[test]
    fn test_placements_and_daughters() {
        let mut store = store();
        let world = store.world();
        let tube = store
            .add_logical(Solid::new("Tube", Shape::tube(1.0, 2.0, 3.0)), "G4_Al", Colour::Grey)
            .unwrap();
        for copy in 0..3 {
            store
                .place(tube, world, Placement::along_z(copy as f64 * 10.0), copy)
                .unwrap();
        }
        assert_eq!(store.placements_of(tube).count(), 3);
        assert_eq!(store.daughters_of(world).count(), 3);
        assert_eq!(store.daughters_of(tube).count(), 0);
        assert!(store.summary().contains("Tube #2"));
    }

    #[test]
    fn test_invalid_solid_not_stored() {
        let mut store = store();
        let result = store.add_logical(Solid::new("Bad", Shape::boxed(0.0, 1.0, 1.0)), "G4_Al", Colour::Grey);
        assert!(result.is_err());
        assert_eq!(store.logical_count(), 1);
    }
}
