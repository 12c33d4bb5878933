//! Target chambers.
//!
//! Two chamber layouts exist. The O17 chamber is an aluminium tube with CF100
//! and CF40 flanges, a threaded counter flange for the holder and a copper
//! cold finger. The Mg25 chamber is a steel holder stack on a long beam line
//! with a tantalum backing and a PVC cooling disc.

use bl2sim_core::module::{ConfigureError, GeometryModule, ModuleError};
use bl2sim_geometry::units::{MM, UM};
use bl2sim_geometry::{Colour, LogicalId, Placement, Shape, Solid, VolumeStore};

/// Which chamber is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamberVariant {
    O17,
    Mg25,
}

impl ChamberVariant {
    pub fn module_name(self) -> &'static str {
        match self {
            ChamberVariant::O17 => "TargetChamberO17",
            ChamberVariant::Mg25 => "TargetChamberMg25",
        }
    }

    fn default_material(self) -> ChamberMaterial {
        match self {
            ChamberVariant::O17 => ChamberMaterial::Aluminium,
            ChamberVariant::Mg25 => ChamberMaterial::Steel,
        }
    }
}

/// Material of the chamber body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamberMaterial {
    Aluminium,
    Steel,
}

impl ChamberMaterial {
    const CHOICES: [&'static str; 2] = ["aluminium", "steel"];

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "aluminium" | "aluminum" | "al" => Some(ChamberMaterial::Aluminium),
            "steel" => Some(ChamberMaterial::Steel),
            _ => None,
        }
    }

    fn material(self) -> &'static str {
        match self {
            ChamberMaterial::Aluminium => "G4_Al",
            ChamberMaterial::Steel => "Steel-316",
        }
    }
}

pub struct TargetChamber {
    variant: ChamberVariant,
    material: ChamberMaterial,
    mother: Option<String>,
}

impl TargetChamber {
    pub fn new(variant: ChamberVariant) -> Self {
        Self {
            variant,
            material: variant.default_material(),
            mother: None,
        }
    }

    pub fn o17() -> Self {
        Self::new(ChamberVariant::O17)
    }

    pub fn mg25() -> Self {
        Self::new(ChamberVariant::Mg25)
    }

    /// Place the module inside `mother`'s envelope, or in the world for
    /// `None`.
    pub fn with_mother(mut self, mother: Option<&str>) -> Self {
        self.mother = mother.map(String::from);
        self
    }

    pub fn variant(&self) -> ChamberVariant {
        self.variant
    }

    pub fn material(&self) -> ChamberMaterial {
        self.material
    }

    fn prefixed(&self, part: &str) -> String {
        format!("{}_{}", self.variant.module_name(), part)
    }

    fn construct_o17(&self, mother: LogicalId, volumes: &mut VolumeStore) -> Result<(), ModuleError> {
        let length_cf100 = 18.0 * MM;
        let length_cf40 = 13.0 * MM;
        let length_tube = 234.0 * MM;
        let length_counter_flange = 13.0 * MM;
        let length_cold_finger = length_tube + length_counter_flange + length_cf40 + length_cf100;
        let r_inner_tube = 0.5 * 37.0 * MM;
        let r_outer_tube = 0.5 * 40.0 * MM;
        let r_inner_counter = 0.5 * 38.0 * MM;
        let r_outer_counter = 0.5 * 52.0 * MM;
        let target_length = 0.25 * MM;

        let z0 = length_cf100 + length_cf40;
        let z1 = z0 + length_tube;
        let z2 = z1 + length_counter_flange;
        let body = Shape::polycone(
            &[z0, z1, z1, z2],
            &[r_inner_tube, r_inner_tube, r_inner_counter, r_inner_counter],
            &[r_outer_tube, r_outer_tube, r_outer_counter, r_outer_counter],
        );

        let cf100 = volumes.add_logical(
            Solid::new(
                self.prefixed("CF100"),
                Shape::tube(0.5 * 37.0 * MM, 0.5 * 114.0 * MM, 0.5 * length_cf100),
            ),
            "Steel-316",
            Colour::Green,
        )?;
        let cf40 = volumes.add_logical(
            Solid::new(
                self.prefixed("CF40"),
                Shape::tube(0.5 * 37.0 * MM, 0.5 * 70.0 * MM, 0.5 * length_cf40),
            ),
            "Steel-316",
            Colour::Green,
        )?;
        let cold_finger = volumes.add_logical(
            Solid::new(
                self.prefixed("ColdFinger"),
                Shape::tube(0.5 * 24.0 * MM, 0.5 * 26.0 * MM, 0.5 * length_cold_finger),
            ),
            "G4_Cu",
            Colour::Brown,
        )?;
        let chamber = volumes.add_logical(
            Solid::new(self.prefixed("Body"), body),
            self.material.material(),
            Colour::Yellow,
        )?;

        let tail = length_tube + length_counter_flange - target_length;
        volumes.place(
            cf100,
            mother,
            Placement::along_z(-(0.5 * length_cf100 + length_cf40 + tail)),
            0,
        )?;
        volumes.place(cf40, mother, Placement::along_z(-(0.5 * length_cf40 + tail)), 0)?;
        volumes.place(
            cold_finger,
            mother,
            Placement::along_z(-(0.5 * length_cold_finger + 13.0 * MM)),
            0,
        )?;
        volumes.place(
            chamber,
            mother,
            Placement::along_z(-(length_cf100 + length_cf40 + tail)),
            0,
        )?;
        Ok(())
    }

    fn construct_mg25(&self, mother: LogicalId, volumes: &mut VolumeStore) -> Result<(), ModuleError> {
        let beam_line_length = 275.0 * MM;
        let flange_width = 12.5 * MM;
        let body = self.material.material();

        // (part, r_min, r_max, half_z, z, material, colour)
        let parts = [
            ("holderSS1", 11.95, 25.00, 2.5, -2.5, body, Colour::Grey),
            ("holderSS2", 20.94, 25.00, 1.0, 1.0, body, Colour::Grey),
            ("holderSS3", 23.98, 25.00, 1.5, 3.5, body, Colour::Grey),
            ("holderSS4", 23.98, 29.48, 5.0, 10.0, body, Colour::Grey),
            ("backing", 0.0, 19.0, 0.2, 0.2, "G4_Ta", Colour::Grey),
            ("cooling", 0.0, 29.48, 2.5, 17.505, "G4_POLYVINYL_CHLORIDE", Colour::White),
        ];
        for (part, r_min, r_max, half_z, z, material, colour) in parts {
            let lv = volumes.add_logical(
                Solid::new(self.prefixed(part), Shape::tube(r_min * MM, r_max * MM, half_z * MM)),
                material,
                colour,
            )?;
            volumes.place(lv, mother, Placement::along_z(z * MM), 0)?;
        }

        let beam_line = volumes.add_logical(
            Solid::new(
                self.prefixed("beamline"),
                Shape::tube(23.5 * MM, 25.0 * MM, 0.5 * beam_line_length - 10.0 * UM),
            ),
            body,
            Colour::Grey,
        )?;
        let vacuum = volumes.add_logical(
            Solid::new(
                self.prefixed("beamlinevac"),
                Shape::tube(0.0, 23.5 * MM - 10.0 * UM, 0.5 * beam_line_length),
            ),
            "G4_Galactic",
            Colour::Invisible,
        )?;
        let flange = volumes.add_logical(
            Solid::new(
                self.prefixed("flange"),
                Shape::tube(25.0 * MM + 10.0 * UM, 50.0 * MM, 0.5 * flange_width),
            ),
            body,
            Colour::Grey,
        )?;

        let centre = -(0.5 * beam_line_length + 5.0 * MM);
        volumes.place(beam_line, mother, Placement::along_z(centre), 0)?;
        volumes.place(vacuum, mother, Placement::along_z(centre), 0)?;
        volumes.place(
            flange,
            mother,
            Placement::along_z(-(0.5 * flange_width - 12.5 * MM + 280.0 * MM)),
            0,
        )?;
        Ok(())
    }
}

impl GeometryModule for TargetChamber {
    fn name(&self) -> &str {
        self.variant.module_name()
    }

    fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }

    fn construct(
        &mut self,
        mother: LogicalId,
        volumes: &mut VolumeStore,
    ) -> Result<Option<LogicalId>, ModuleError> {
        match self.variant {
            ChamberVariant::O17 => self.construct_o17(mother, volumes)?,
            ChamberVariant::Mg25 => self.construct_mg25(mother, volumes)?,
        }
        Ok(None)
    }

    fn configure(&mut self, option: &str, value: &str) -> Result<(), ConfigureError> {
        match option {
            "material" => {
                self.material = ChamberMaterial::parse(value).ok_or_else(|| {
                    ConfigureError::invalid_value(self.name(), option, value, &ChamberMaterial::CHOICES)
                })?;
                Ok(())
            }
            _ => Err(ConfigureError::unknown_option(self.name(), option)),
        }
    }
}
